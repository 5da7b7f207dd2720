//! The driver's key=value configuration-file reader.
//!
//! This is deliberately small: a single malformed line never aborts the rest of the
//! file, it just logs a warning and leaves that key at its documented default,
//! mirroring `run.py`'s flat `PFConfig` field assignment.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::filter::FilterConfig;

/// A parsed config file, reduced to a `FilterConfig` plus the optional start pose and
/// PRNG seed the driver needs but the filter config itself doesn't carry directly.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub filter: FilterConfig,
    pub seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            seed: None,
        }
    }
}

/// Reads and parses a config file at `path`. An unreadable file is logged and the
/// defaults are used for every key (construction-time failure degrades rather than
/// aborts). A malformed individual value keeps that key's default and logs a warning.
pub fn load<P: AsRef<Path>>(path: P) -> DriverConfig {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => parse(&contents),
        Err(e) => {
            log::error!(
                "failed to read config file {}: {}; using defaults",
                path.display(),
                e
            );
            DriverConfig::default()
        }
    }
}

/// Reads a config file, returning the underlying IO error instead of degrading — used
/// by callers (tests, `--strict` tooling) that want to distinguish "file missing" from
/// "file present but empty".
pub fn try_load<P: AsRef<Path>>(path: P) -> Result<DriverConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse(&contents))
}

/// Parses already-read config text (the recognized keys listed below; everything else
/// is ignored).
pub fn parse(contents: &str) -> DriverConfig {
    let mut config = DriverConfig::default();
    let mut start = (None, None, None);

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            log::warn!("config line {:?} is not a key=value pair, ignoring", line);
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        macro_rules! set_f64 {
            ($field:expr) => {
                match value.parse::<f64>() {
                    Ok(v) => $field = v,
                    Err(_) => log::warn!(
                        "config key {:?} has an unparseable value {:?}, keeping default",
                        key,
                        value
                    ),
                }
            };
        }
        macro_rules! set_usize {
            ($field:expr) => {
                match value.parse::<usize>() {
                    Ok(v) => $field = v,
                    Err(_) => log::warn!(
                        "config key {:?} has an unparseable value {:?}, keeping default",
                        key,
                        value
                    ),
                }
            };
        }

        match key.as_str() {
            "NUM_PARTICLES" => set_usize!(config.filter.num_particles),
            "UPDATES_PER_FRAME" => set_usize!(config.filter.updates_per_frame),
            "PARTICLE_MOVE_SPEED" => set_f64!(config.filter.particle_move_speed),
            "RANDOM_WALK_FREQUENCY" => match value.parse::<u64>() {
                Ok(v) => config.filter.random_walk_frequency = v,
                Err(_) => log::warn!(
                    "config key {:?} has an unparseable value {:?}, keeping default",
                    key,
                    value
                ),
            },
            "RANDOM_WALK_MAX_DIST" => set_f64!(config.filter.random_walk_max_dist),
            "RANDOM_WALK_MAX_THETA" => set_f64!(config.filter.random_walk_max_theta),
            "WEIGHT_DECAY_RATE" => set_f64!(config.filter.weight_decay_rate),
            "CLUSTER_BIN_WIDTH" => set_f64!(config.filter.cluster_bin_width),
            "START_X" => match value.parse::<f64>() {
                Ok(v) => start.0 = Some(v),
                Err(_) => log::warn!("config key \"START_X\" has an unparseable value {:?}", value),
            },
            "START_Y" => match value.parse::<f64>() {
                Ok(v) => start.1 = Some(v),
                Err(_) => log::warn!("config key \"START_Y\" has an unparseable value {:?}", value),
            },
            "START_THETA" => match value.parse::<f64>() {
                Ok(v) => start.2 = Some(v),
                Err(_) => log::warn!("config key \"START_THETA\" has an unparseable value {:?}", value),
            },
            "SEED" => match value.parse::<u64>() {
                Ok(v) => config.seed = Some(v),
                Err(_) => log::warn!("config key \"SEED\" has an unparseable value {:?}", value),
            },
            other => log::warn!("config key {:?} is not recognized, ignoring", other),
        }
    }

    if let (Some(x), Some(y), Some(theta)) = start {
        config.filter.start_pose = Some((x, y, theta));
    }

    config
}
