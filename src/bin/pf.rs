//! The `pf` driver binary: wires `BuildingMap`, `FeedProcessor`, and `ParticleFilter`
//! together behind a CLI/config surface. It does not render anything — the GUI canvas
//! and the interactive feed-authoring simulation are out of scope —
//! but it accepts their flags for interface compatibility and logs that those modes
//! aren't implemented in this build rather than silently ignoring them.

use std::path::PathBuf;

use clap::Parser;

use globalmcl::config::DriverConfig;
use globalmcl::{BuildingMap, FeedProcessor, ParticleFilter};

/// Region-classifier Monte-Carlo indoor localization driver.
#[derive(Parser, Debug)]
#[command(name = "pf", about = "Region-classifier Monte-Carlo indoor localization driver")]
struct Args {
    /// Path to the observation feed file.
    #[arg(long)]
    feed: PathBuf,

    /// Path to the map-data (region raster) file.
    #[arg(long = "map")]
    map_data: PathBuf,

    /// Path to a key=value configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Background map image, consumed only by the (unimplemented) GUI renderer.
    #[arg(long = "map-image")]
    map_image: Option<PathBuf>,

    /// Loop the feed once exhausted instead of coasting to a stop.
    #[arg(long = "loop")]
    loop_feed: bool,

    /// Enter interactive feed-authoring mode. Not implemented in this build; accepted
    /// only so the CLI surface matches the external feed-generation collaborator.
    #[arg(long = "make-feed")]
    make_feed: bool,

    /// Disable the (unimplemented) GUI renderer. Headless is the only mode this build
    /// supports, so this flag is accepted but has no additional effect.
    #[arg(long = "display-off")]
    display_off: bool,

    /// Classifier noise standard deviation, 0 disables.
    #[arg(long = "classifier-noise", default_value_t = 0.0)]
    classifier_noise: f64,

    /// Motion noise magnitude, 0 disables.
    #[arg(long = "motion-noise", default_value_t = 0.0)]
    motion_noise: f64,

    /// Ignore region probabilities and use a uniform distribution instead.
    #[arg(long = "ignore-regions")]
    ignore_regions: bool,

    /// Stop after this many ticks. 0 means run until the feed is exhausted and not
    /// looping (an ambient addition for batch/test runs: the driver needs a
    /// termination condition when not looping forever).
    #[arg(long = "max-ticks", default_value_t = 0)]
    max_ticks: u64,

    /// Overrides the `RUST_LOG` filter for this run (e.g. `debug`).
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    if let Some(level) = &args.log_level {
        std::env::set_var("RUST_LOG", level);
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if args.make_feed {
        log::info!(
            "--make-feed requests the interactive feed-authoring simulation, which this build does not implement; exiting"
        );
        return;
    }
    if args.map_image.is_some() || args.display_off {
        log::info!("GUI rendering is not implemented in this build; running headless");
    }

    let mut map = match BuildingMap::load(&args.map_data) {
        Ok(map) => map,
        Err(e) => {
            log::error!("fatal: could not load map {}: {}", args.map_data.display(), e);
            std::process::exit(1);
        }
    };

    let driver_config = match &args.config {
        Some(path) => globalmcl::config::load(path),
        None => DriverConfig::default(),
    };

    let mut feed = FeedProcessor::new(
        &args.feed,
        args.loop_feed,
        args.classifier_noise,
        args.motion_noise,
        args.ignore_regions,
    );

    let mut filter = match driver_config.seed {
        Some(seed) => ParticleFilter::with_seed(driver_config.filter, &map, seed),
        None => ParticleFilter::new(driver_config.filter, &map),
    };

    let mut tick_count: u64 = 0;
    loop {
        if args.max_ticks > 0 && tick_count >= args.max_ticks {
            log::info!("reached --max-ticks={}; stopping", args.max_ticks);
            break;
        }

        let applied = filter.tick(&mut feed, &mut map);
        tick_count += 1;

        match filter.best_estimate() {
            Some(estimate) => log::info!(
                "tick {}: best=({}, {}, {:.3}) weight={:.3} applied=(speed={:.3}, turn={:.3}) ground_truth={:?}",
                tick_count,
                estimate.predicted_x,
                estimate.predicted_y,
                estimate.predicted_theta,
                estimate.total_weight,
                applied.move_speed,
                applied.turn_angle,
                filter.ground_truth(),
            ),
            None => log::info!("tick {}: no clusters (empty population)", tick_count),
        }

        if !args.loop_feed && !feed.has_next() {
            log::info!("feed exhausted and not looping; stopping after {} ticks", tick_count);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_arguments_are_rejected_before_any_io() {
        assert!(Args::try_parse_from(["pf"]).is_err());
        assert!(Args::try_parse_from(["pf", "--feed", "feed.txt"]).is_err());
        assert!(Args::try_parse_from(["pf", "--map", "map.txt"]).is_err());
    }

    #[test]
    fn required_arguments_alone_are_sufficient() {
        let args = Args::try_parse_from(["pf", "--feed", "feed.txt", "--map", "map.txt"]).unwrap();
        assert_eq!(args.feed, PathBuf::from("feed.txt"));
        assert_eq!(args.map_data, PathBuf::from("map.txt"));
        assert!(!args.loop_feed);
        assert_eq!(args.classifier_noise, 0.0);
    }
}
