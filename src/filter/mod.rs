//! The Monte-Carlo particle filter — the core of the system.

pub mod cluster;
pub mod particle;

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::feed::Observation;
use crate::map::BuildingMap;

pub use cluster::Cluster;
pub use particle::Particle;

/// Tunable parameters for a `ParticleFilter` run.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub num_particles: usize,
    pub updates_per_frame: usize,
    pub particle_move_speed: f64,
    pub random_walk_frequency: u64,
    pub random_walk_max_dist: f64,
    pub random_walk_max_theta: f64,
    pub weight_decay_rate: f64,
    pub cluster_bin_width: f64,
    /// Optional tight prior: every particle starts exactly here instead of uniformly
    /// scattered across the map.
    pub start_pose: Option<(f64, f64, f64)>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_particles: 2000,
            updates_per_frame: 1,
            particle_move_speed: 3.0,
            random_walk_frequency: 3,
            random_walk_max_dist: 80.0,
            random_walk_max_theta: PI / 4.0,
            weight_decay_rate: 1.0,
            cluster_bin_width: 20.0,
            start_pose: None,
        }
    }
}

/// The applied motion for one tick, returned to the driver for display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AppliedMotion {
    pub move_speed: f64,
    pub turn_angle: f64,
}

/// The Monte-Carlo particle filter: owns the particle population and the per-tick
/// pipeline of motion, reweighting, resampling, and clustering.
pub struct ParticleFilter {
    config: FilterConfig,
    particles: Vec<Particle>,
    frame: u64,
    rng: StdRng,
    clusters: Vec<Cluster>,
    best_cluster: usize,
    ground_truth: Option<crate::feed::GroundTruth>,
}

impl ParticleFilter {
    /// Builds a filter seeded from OS entropy (matches the source's unseeded
    /// `thread_rng`; see `with_seed` for reproducible runs).
    pub fn new(config: FilterConfig, map: &BuildingMap) -> Self {
        Self::build(config, map, StdRng::from_entropy())
    }

    /// Builds a filter with a deterministic PRNG seed, so repeated runs over the same
    /// map/feed produce bit-identical particle trajectories.
    pub fn with_seed(config: FilterConfig, map: &BuildingMap, seed: u64) -> Self {
        Self::build(config, map, StdRng::seed_from_u64(seed))
    }

    fn build(config: FilterConfig, map: &BuildingMap, mut rng: StdRng) -> Self {
        let n = config.num_particles;
        let mut particles = Vec::with_capacity(n);
        for _ in 0..n {
            let particle = match config.start_pose {
                Some((x, y, theta)) => Particle::new(x, y, theta),
                None => {
                    let x = rng.gen_range(1..=map.width().max(1)) as f64;
                    let y = rng.gen_range(1..=map.height().max(1)) as f64;
                    let theta = rng.gen_range(0.0..2.0 * PI);
                    Particle::new(x, y, theta)
                }
            };
            particles.push(particle);
        }

        Self {
            config,
            particles,
            frame: 0,
            rng,
            clusters: Vec::new(),
            best_cluster: 0,
            ground_truth: None,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn best_cluster(&self) -> usize {
        self.best_cluster
    }

    pub fn ground_truth(&self) -> Option<crate::feed::GroundTruth> {
        self.ground_truth
    }

    /// The pose estimate of the current best cluster, if any particles survive.
    pub fn best_estimate(&self) -> Option<Cluster> {
        self.clusters.get(self.best_cluster).copied()
    }

    /// Runs one external tick: pulls one observation from `feed`, applies it to
    /// `map`, then repeats the inner predict/update/resample/cluster pipeline
    /// `updates_per_frame` times.
    ///
    /// Returns the `(move_speed, turn_angle)` actually applied during the tick, for
    /// downstream display — `AppliedMotion::default()` (zeros) if no motion was
    /// present in the observation.
    pub fn tick(&mut self, feed: &mut crate::feed::FeedProcessor, map: &mut BuildingMap) -> AppliedMotion {
        let observation: Observation = feed.next();
        self.ground_truth = observation.ground_truth;

        if let Some(probs) = &observation.region_probs {
            map.set_probabilities(probs);
        }

        let applied = observation
            .motion
            .map(|m| AppliedMotion {
                move_speed: m.move_speed,
                turn_angle: m.turn_angle,
            })
            .unwrap_or_default();

        for _ in 0..self.config.updates_per_frame {
            self.update_once(observation.motion, map);
        }

        applied
    }

    fn update_once(&mut self, motion: Option<crate::feed::Motion>, map: &BuildingMap) {
        if self.particles.is_empty() {
            // num_particles = 0 is a no-op.
            self.clusters.clear();
            self.best_cluster = 0;
            return;
        }

        self.apply_motion(motion);
        self.apply_random_walk();

        let max_w = self.reweight(map);
        if max_w <= 0.0 {
            log::warn!(
                "frame {}: max particle weight is {} after reweighting; skipping normalize/resample/cluster this iteration",
                self.frame,
                max_w
            );
            self.frame += 1;
            return;
        }

        let weight_sum = self.normalize(max_w);
        self.resample(weight_sum);

        let (clusters, best) = cluster::cluster_and_estimate(
            &mut self.particles,
            map.width(),
            map.height(),
            self.config.cluster_bin_width,
        );
        self.clusters = clusters;
        self.best_cluster = best;

        self.frame += 1;
    }

    /// Advances every particle by the odometry reading, then applies a symmetric
    /// random-sign turn jitter.
    fn apply_motion(&mut self, motion: Option<crate::feed::Motion>) {
        let Some(motion) = motion else { return };

        for particle in self.particles.iter_mut() {
            particle.x += motion.move_speed * particle.theta.cos();
            particle.y += motion.move_speed * particle.theta.sin();
        }

        for particle in self.particles.iter_mut() {
            let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            particle.theta += sign * motion.turn_angle;
        }
    }

    /// Periodically perturbs every particle's pose to inject exploration entropy.
    fn apply_random_walk(&mut self) {
        let freq = self.config.random_walk_frequency;
        if freq == 0 || self.frame % freq != 0 {
            return;
        }

        let half_d = (self.config.random_walk_max_dist / 2.0) as i64;
        let half_t = self.config.random_walk_max_theta / 2.0;
        for particle in self.particles.iter_mut() {
            let dx = if half_d > 0 { self.rng.gen_range(-half_d..half_d) } else { 0 };
            let dy = if half_d > 0 { self.rng.gen_range(-half_d..half_d) } else { 0 };
            let dtheta = self.rng.gen_range(-half_t..half_t);
            particle.x += dx as f64;
            particle.y += dy as f64;
            particle.theta += dtheta;
        }
    }

    /// Reweights every particle by the map's likelihood at its (truncated) cell,
    /// blended toward 1 by `weight_decay_rate`. Returns the
    /// maximum weight across the population.
    fn reweight(&mut self, map: &BuildingMap) -> f64 {
        let decay = self.config.weight_decay_rate;
        self.particles
            .par_iter_mut()
            .for_each(|particle| {
                let (x, y) = particle.cell();
                let mut w_obs = map.probability_of(x, y);
                w_obs += (1.0 - w_obs) * (1.0 - decay);
                particle.weight *= w_obs;
            });

        self.particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Divides every weight by `max_w` so the peak weight is exactly 1.0. Returns the
    /// resulting sum of weights, used as the resampling
    /// range.
    fn normalize(&mut self, max_w: f64) -> f64 {
        let mut sum = 0.0;
        for particle in self.particles.iter_mut() {
            particle.weight /= max_w;
            sum += particle.weight;
        }
        sum
    }

    /// Low-variance resampling: builds a fresh population of size N by repeatedly
    /// drawing a uniform target in `[0, weight_sum)` and linearly scanning the
    /// cumulative weight. Implemented as sorted systematic draws —
    /// a single ascending scan over the population rather than N independent linear
    /// scans — which is observationally equivalent (selection probability `w_i /
    /// weight_sum`, population size N) but avoids the O(N^2) worst case.
    fn resample(&mut self, weight_sum: f64) {
        let n = self.particles.len();

        let mut draws: Vec<f64> = (0..n)
            .map(|_| self.rng.gen_range(0.0..1.0) * weight_sum)
            .collect();
        draws.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut new_particles = Vec::with_capacity(n);
        let mut index = 0;
        let mut cumulative = self.particles[0].weight;
        for &target in &draws {
            while cumulative < target && index < n - 1 {
                index += 1;
                cumulative += self.particles[index].weight;
            }
            let mut clone = self.particles[index];
            clone.cluster_id = 0;
            new_particles.push(clone);
        }

        self.particles = new_particles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedProcessor;

    fn uniform_hallway_map(w: usize, h: usize) -> BuildingMap {
        let rows: Vec<String> = (0..h)
            .map(|_| vec!["1"; w].join(","))
            .collect();
        BuildingMap::parse(&rows.join("\n")).unwrap()
    }

    #[test]
    fn zero_particles_is_a_no_op() {
        let map = uniform_hallway_map(3, 3);
        let mut config = FilterConfig::default();
        config.num_particles = 0;
        let mut filter = ParticleFilter::with_seed(config, &map, 1);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let mut map = map;
        filter.tick(&mut feed, &mut map);
        assert!(filter.clusters().is_empty());
        assert_eq!(filter.best_cluster(), 0);
    }

    #[test]
    fn all_hallway_map_normalizes_particles_to_one() {
        let map = uniform_hallway_map(3, 3);
        let mut config = FilterConfig::default();
        config.num_particles = 100;
        config.weight_decay_rate = 1.0;
        config.random_walk_frequency = 0;
        let mut filter = ParticleFilter::with_seed(config, &map, 42);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let mut map = map;
        filter.tick(&mut feed, &mut map);

        for particle in filter.particles() {
            let (x, y) = particle.cell();
            if x >= 0 && x < 3 && y >= 0 && y < 3 {
                assert!((particle.weight - 1.0).abs() < 1e-9);
            } else {
                assert_eq!(particle.weight, 0.0);
            }
        }
        assert_eq!(filter.clusters().len(), 1);
        assert!(filter.clusters()[0].total_weight >= 0.0 && filter.clusters()[0].total_weight <= 100.0);
    }

    #[test]
    fn zero_observation_skips_normalize_and_keeps_prior_clusters() {
        let map = uniform_hallway_map(3, 3);
        let mut config = FilterConfig::default();
        config.num_particles = 20;
        config.random_walk_frequency = 0;
        let mut filter = ParticleFilter::with_seed(config, &map, 7);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n0 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let mut map = map;

        filter.tick(&mut feed, &mut map);
        let clusters_before = filter.clusters().to_vec();
        assert!(!clusters_before.is_empty());

        filter.tick(&mut feed, &mut map);
        assert_eq!(filter.clusters(), clusters_before.as_slice());
    }

    #[test]
    fn exhausted_non_looping_feed_still_emits_clusters() {
        let map = uniform_hallway_map(3, 3);
        let mut config = FilterConfig::default();
        config.num_particles = 10;
        config.random_walk_frequency = 0;
        let mut filter = ParticleFilter::with_seed(config, &map, 3);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n1 0 0 0 0 0\n1 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let mut map = map;

        for _ in 0..4 {
            filter.tick(&mut feed, &mut map);
        }
        assert!(!filter.clusters().is_empty());
    }

    #[test]
    fn resampling_preserves_population_size() {
        let map = uniform_hallway_map(5, 5);
        let mut config = FilterConfig::default();
        config.num_particles = 57;
        let mut filter = ParticleFilter::with_seed(config, &map, 99);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n", true, 0.0, 0.0, false);
        let mut map = map;
        for _ in 0..5 {
            filter.tick(&mut feed, &mut map);
            assert_eq!(filter.particles().len(), 57);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let map = uniform_hallway_map(10, 10);
        let config = FilterConfig {
            num_particles: 200,
            ..FilterConfig::default()
        };

        let mut map_a = map.clone();
        let mut filter_a = ParticleFilter::with_seed(config.clone(), &map_a, 123);
        let mut feed_a = FeedProcessor::parse("1 0 0 0 0 0\n+ 3 0.1\n", true, 0.0, 0.0, false);

        let mut map_b = map.clone();
        let mut filter_b = ParticleFilter::with_seed(config, &map_b, 123);
        let mut feed_b = FeedProcessor::parse("1 0 0 0 0 0\n+ 3 0.1\n", true, 0.0, 0.0, false);

        for _ in 0..10 {
            filter_a.tick(&mut feed_a, &mut map_a);
            filter_b.tick(&mut feed_b, &mut map_b);
        }

        assert_eq!(filter_a.particles(), filter_b.particles());
    }

    #[test]
    fn empty_map_zero_weights_everyone() {
        let map = BuildingMap::parse("").unwrap();
        let mut config = FilterConfig::default();
        config.num_particles = 10;
        config.random_walk_frequency = 0;
        let mut filter = ParticleFilter::with_seed(config, &map, 5);
        let mut feed = FeedProcessor::parse("1 0 0 0 0 0\n", false, 0.0, 0.0, false);
        let mut map = map;
        filter.tick(&mut feed, &mut map);
        for particle in filter.particles() {
            assert_eq!(particle.weight, 0.0);
        }
    }
}
