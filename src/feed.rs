//! The observation feed parser.

use std::fs;
use std::path::Path;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::FeedError;

/// Motion attached to a tick by a `+` line: forward speed and turn angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub move_speed: f64,
    pub turn_angle: f64,
}

/// Ground truth attached to a tick by a `!` line, used only as a passthrough for
/// display/scoring — the filter never conditions on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruth {
    pub x: i32,
    pub y: i32,
    pub theta: f64,
}

/// One tick's data triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub region_probs: Option<Vec<f64>>,
    pub motion: Option<Motion>,
    pub ground_truth: Option<GroundTruth>,
}

/// Lazily-looping sequence of observations, parsed once at construction.
///
/// Mirrors `feed_processor.py`: construction never fails outwardly (an unreadable or
/// unparseable file is logged and degrades to an empty stream);
/// callers that want the underlying cause should check the file themselves first.
pub struct FeedProcessor {
    probability_list: Vec<Vec<f64>>,
    motions: Vec<Option<Motion>>,
    ground_truths: Vec<Option<GroundTruth>>,
    loop_feed: bool,
    classifier_noise: f64,
    motion_noise: f64,
    next_index: usize,
}

impl FeedProcessor {
    /// Reads and parses `feed_file_name`. See the type docs for the failure model.
    pub fn new<P: AsRef<Path>>(
        feed_file_name: P,
        loop_feed: bool,
        classifier_noise: f64,
        motion_noise: f64,
        ignore_regions: bool,
    ) -> Self {
        let path = feed_file_name.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("failed to load feed file {}: {}", path.display(), e);
                String::new()
            }
        };
        Self::parse(&contents, loop_feed, classifier_noise, motion_noise, ignore_regions)
    }

    /// Reads and parses `feed_file_name`, returning the underlying IO error instead of
    /// degrading — used by callers (tests, `--strict` tooling) that want to distinguish
    /// "file missing" from "file present but empty", mirroring
    /// `config::try_load`/`BuildingMap::load`.
    pub fn try_new<P: AsRef<Path>>(
        feed_file_name: P,
        loop_feed: bool,
        classifier_noise: f64,
        motion_noise: f64,
        ignore_regions: bool,
    ) -> Result<Self, FeedError> {
        let path = feed_file_name.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| FeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&contents, loop_feed, classifier_noise, motion_noise, ignore_regions))
    }

    /// Parses already-read feed text. Split out from [`FeedProcessor::new`] so tests
    /// (and precision round-trip tests) can exercise the grammar without touching the
    /// filesystem.
    ///
    /// Unlike the source's broad `except`, a malformed individual line is logged and
    /// skipped rather than abandoning the rest of the file — the grammar here doesn't
    /// require an all-or-nothing parse, and this is more robust for long feeds.
    pub fn parse(
        contents: &str,
        loop_feed: bool,
        classifier_noise: f64,
        motion_noise: f64,
        ignore_regions: bool,
    ) -> Self {
        let mut probability_list = Vec::new();
        let mut motions = Vec::new();
        let mut ground_truths = Vec::new();

        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('+') {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                if tokens.len() >= 2 {
                    match (tokens[0].parse::<i64>(), tokens[1].parse::<f64>()) {
                        (Ok(speed), Ok(angle)) => {
                            if let Some(last) = motions.last_mut() {
                                *last = Some(Motion {
                                    move_speed: speed as f64,
                                    turn_angle: angle,
                                });
                            }
                        }
                        _ => log::warn!("feed line {}: malformed motion line", lineno),
                    }
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix('!') {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                if tokens.len() >= 3 {
                    match (
                        tokens[0].parse::<i32>(),
                        tokens[1].parse::<i32>(),
                        tokens[2].parse::<f64>(),
                    ) {
                        (Ok(x), Ok(y), Ok(theta)) => {
                            if let Some(last) = ground_truths.last_mut() {
                                *last = Some(GroundTruth { x, y, theta });
                            }
                        }
                        _ => log::warn!("feed line {}: malformed ground-truth line", lineno),
                    }
                }
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let parsed: Result<Vec<f64>, _> = tokens.iter().map(|t| t.parse::<f64>()).collect();
            match parsed {
                Ok(probs) => {
                    if ignore_regions {
                        let count = probs.len();
                        probability_list.push(vec![1.0 / count as f64; count]);
                    } else {
                        probability_list.push(probs);
                    }
                    motions.push(None);
                    ground_truths.push(None);
                }
                Err(_) => log::warn!("feed line {}: malformed probability line", lineno),
            }
        }

        Self {
            probability_list,
            motions,
            ground_truths,
            loop_feed,
            classifier_noise,
            motion_noise,
            next_index: 0,
        }
    }

    /// True while another entry remains; with looping enabled and a nonempty feed, this
    /// is always true.
    pub fn has_next(&self) -> bool {
        self.probability_list.len() > self.next_index
    }

    /// Returns the next observation, advancing (and possibly wrapping) the cursor.
    ///
    /// If the stream is exhausted and not looping, returns the all-`None` sentinel
    /// rather than an `Option`/`Result` — the filter is expected to keep ticking
    /// on a coasting, motion-free feed.
    pub fn next(&mut self) -> Observation {
        let num_feeds = self.probability_list.len();
        if self.next_index >= num_feeds {
            return Observation::default();
        }

        let mut probs = self.probability_list[self.next_index].clone();
        if self.classifier_noise > 0.0 {
            probs = add_classifier_noise(probs, self.classifier_noise);
        }

        let mut motion = self.motions[self.next_index];
        if self.motion_noise > 0.0 {
            motion = add_motion_noise(motion, self.motion_noise);
        }

        let ground_truth = self.ground_truths[self.next_index];

        self.next_index += 1;
        if self.next_index >= num_feeds && self.loop_feed {
            self.next_index = 0;
        }

        Observation {
            region_probs: Some(probs),
            motion,
            ground_truth,
        }
    }
}

fn add_motion_noise(motion: Option<Motion>, motion_noise: f64) -> Option<Motion> {
    let motion = motion?;
    let mut rng = rand::thread_rng();

    let move_draw: f64 = rng.gen_range(0.0..1.0) * motion_noise;
    let move_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let move_speed = motion.move_speed + move_sign * move_draw * motion.move_speed;

    let turn_draw: f64 = rng.gen_range(0.0..1.0) * motion_noise;
    let turn_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let turn_angle = motion.turn_angle + turn_sign * turn_draw * std::f64::consts::FRAC_PI_2;

    Some(Motion {
        move_speed,
        turn_angle,
    })
}

fn add_classifier_noise(mut region_probs: Vec<f64>, classifier_noise: f64) -> Vec<f64> {
    let normal = Normal::new(0.0, classifier_noise).expect("classifier_noise must be >= 0");
    let mut rng = rand::thread_rng();

    for p in region_probs.iter_mut() {
        let noise = normal.sample(&mut rng).abs();
        if *p == 1.0 {
            *p = (*p - noise).abs();
        } else {
            *p += noise;
        }
    }

    let norm = region_probs.iter().map(|p| p * p).sum::<f64>().sqrt();
    if norm > 0.0 {
        for p in region_probs.iter_mut() {
            *p /= norm;
        }
    }
    region_probs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_are_skipped() {
        let mut feed = FeedProcessor::parse("# a comment\n\n1 0 0 0 0 0\n", true, 0.0, 0.0, false);
        assert!(feed.has_next());
        let obs = feed.next();
        assert_eq!(obs.region_probs, Some(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn motion_and_ground_truth_attach_to_prior_entry() {
        let mut feed = FeedProcessor::parse(
            "0.94 0.01 0.01 0.01 0.02 0.01\n+ 3 0.00000\n! 120 84 1.57080\n",
            false,
            0.0,
            0.0,
            false,
        );
        let obs = feed.next();
        assert_eq!(
            obs.motion,
            Some(Motion {
                move_speed: 3.0,
                turn_angle: 0.0
            })
        );
        assert_eq!(
            obs.ground_truth,
            Some(GroundTruth {
                x: 120,
                y: 84,
                theta: 1.57080
            })
        );
    }

    #[test]
    fn plus_line_with_no_prior_entry_is_ignored() {
        let mut feed = FeedProcessor::parse("+ 3 0.1\n1 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let obs = feed.next();
        assert_eq!(obs.motion, None);
    }

    #[test]
    fn non_looping_feed_exhausts_to_sentinel() {
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n0 1 0 0 0 0\n", false, 0.0, 0.0, false);
        assert!(feed.has_next());
        feed.next();
        assert!(feed.has_next());
        feed.next();
        assert!(!feed.has_next());
        assert_eq!(feed.next(), Observation::default());
    }

    #[test]
    fn looping_feed_wraps_and_always_has_next() {
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n0 1 0 0 0 0\n", true, 0.0, 0.0, false);
        let first = feed.next();
        feed.next();
        let wrapped = feed.next();
        assert!(feed.has_next());
        assert_eq!(first.region_probs, wrapped.region_probs);
    }

    #[test]
    fn ignore_regions_replaces_with_uniform_distribution() {
        let mut feed = FeedProcessor::parse("0.94 0.01 0.01 0.01 0.02 0.01\n", false, 0.0, 0.0, true);
        let obs = feed.next();
        let probs = obs.region_probs.unwrap();
        assert_eq!(probs.len(), 6);
        for p in probs {
            assert!((p - 1.0 / 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn unreadable_file_degrades_to_empty_stream() {
        let feed = FeedProcessor::new("/nonexistent/path/to/feed.txt", true, 0.0, 0.0, false);
        assert!(!feed.has_next());
    }

    #[test]
    fn try_new_reports_the_io_error_instead_of_degrading() {
        let err = FeedProcessor::try_new("/nonexistent/path/to/feed.txt", true, 0.0, 0.0, false)
            .unwrap_err();
        assert!(matches!(err, FeedError::Io { .. }));
    }

    #[test]
    fn classifier_noise_keeps_vector_l2_normalized() {
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n", false, 0.05, 0.0, false);
        let obs = feed.next();
        let probs = obs.region_probs.unwrap();
        let norm = probs.iter().map(|p| p * p).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }
}
