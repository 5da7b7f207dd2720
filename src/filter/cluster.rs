//! Spatial clustering of the surviving particle population.
//!
//! Clusters are connected components of non-empty bins on a coarse grid overlaid on
//! the map. The source implements component labeling with recursion over bins; this
//! version uses an explicit union-find (disjoint-set) over *active* bins only, so a
//! map with a huge number of occupied bins cannot blow a call stack, and the work
//! scales with the particle count rather than the full bin grid.

use std::collections::HashMap;

use super::particle::Particle;

/// A single location hypothesis derived from one connected component of particles.
///
/// `predicted_x`/`predicted_y` are floored to match the map's integer cell indexing
/// (they feed back into `BuildingMap::probability_of`-style lookups downstream).
/// `predicted_theta` is *not* floored — flooring an angle in radians to the nearest
/// integer would collapse nearly every heading in `(-1, 1)` to zero, which would
/// defeat any caller trying to read heading convergence off this record; see
/// `DESIGN.md` for this resolved ambiguity. The weighted average of `theta` is also
/// taken linearly rather than circularly, which *is* intentional parity with the
/// source — it is wrong near `±π` and is kept that way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub predicted_x: i64,
    pub predicted_y: i64,
    pub predicted_theta: f64,
    pub total_weight: f64,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Partitions `particles` into spatial clusters and writes each particle's
/// `cluster_id` in place. Returns one [`Cluster`] record per connected component, in
/// ascending id order, plus the index of the "best" (highest total weight, ties to the
/// lower id) cluster. An empty population yields an empty cluster list and a best
/// index of 0, matching the "no cluster exists" case.
pub fn cluster_and_estimate(
    particles: &mut [Particle],
    map_width: usize,
    map_height: usize,
    bin_width: f64,
) -> (Vec<Cluster>, usize) {
    if particles.is_empty() {
        return (Vec::new(), 0);
    }

    let bin_width = if bin_width > 0.0 { bin_width } else { 1.0 };
    let grid_w = ((map_width.max(1) as f64) / bin_width).ceil().max(1.0) as usize;
    let grid_h = ((map_height.max(1) as f64) / bin_width).ceil().max(1.0) as usize;

    let clamp_bin = |v: f64, grid_len: usize| -> usize {
        if v <= 0.0 {
            0
        } else {
            ((v / bin_width) as usize).min(grid_len - 1)
        }
    };

    let particle_bins: Vec<(usize, usize)> = particles
        .iter()
        .map(|p| (clamp_bin(p.x, grid_w), clamp_bin(p.y, grid_h)))
        .collect();

    // Active bins, indexed in the order first encountered (order doesn't affect
    // connectivity, only the union-find's internal numbering).
    let mut bin_index: HashMap<(usize, usize), usize> = HashMap::new();
    for &bin in &particle_bins {
        let next_id = bin_index.len();
        bin_index.entry(bin).or_insert(next_id);
    }

    let mut uf = UnionFind::new(bin_index.len());
    for &(col, row) in bin_index.keys() {
        let &self_idx = bin_index.get(&(col, row)).unwrap();
        for drow in -1i64..=1 {
            for dcol in -1i64..=1 {
                if drow == 0 && dcol == 0 {
                    continue;
                }
                let nrow = row as i64 + drow;
                let ncol = col as i64 + dcol;
                if nrow < 0 || ncol < 0 {
                    continue;
                }
                if let Some(&nbr_idx) = bin_index.get(&(ncol as usize, nrow as usize)) {
                    uf.union(self_idx, nbr_idx);
                }
            }
        }
    }

    // Assign sequential cluster ids in row-major (row then column) bin order: the
    // first time a scan in that order reaches a new component, it gets the next id.
    let mut ordered_bins: Vec<&(usize, usize)> = bin_index.keys().collect();
    ordered_bins.sort_by_key(|&&(col, row)| (row, col));

    let mut root_to_cluster_id: HashMap<usize, usize> = HashMap::new();
    for &bin in &ordered_bins {
        let idx = bin_index[bin];
        let root = uf.find(idx);
        let next_id = root_to_cluster_id.len();
        root_to_cluster_id.entry(root).or_insert(next_id);
    }

    let num_clusters = root_to_cluster_id.len();
    let mut sum_w = vec![0.0_f64; num_clusters];
    let mut sum_wx = vec![0.0_f64; num_clusters];
    let mut sum_wy = vec![0.0_f64; num_clusters];
    let mut sum_wtheta = vec![0.0_f64; num_clusters];

    for (particle, &bin) in particles.iter_mut().zip(particle_bins.iter()) {
        let idx = bin_index[&bin];
        let root = uf.find(idx);
        let cluster_id = root_to_cluster_id[&root];
        particle.cluster_id = cluster_id;

        sum_w[cluster_id] += particle.weight;
        sum_wx[cluster_id] += particle.weight * particle.x;
        sum_wy[cluster_id] += particle.weight * particle.y;
        sum_wtheta[cluster_id] += particle.weight * particle.theta;
    }

    let mut clusters = Vec::with_capacity(num_clusters);
    let mut best_index = 0;
    let mut best_weight = f64::NEG_INFINITY;
    for id in 0..num_clusters {
        let total_weight = sum_w[id];
        let (x, y, theta) = if total_weight > 0.0 {
            (
                sum_wx[id] / total_weight,
                sum_wy[id] / total_weight,
                sum_wtheta[id] / total_weight,
            )
        } else {
            (0.0, 0.0, 0.0)
        };
        clusters.push(Cluster {
            predicted_x: x.floor() as i64,
            predicted_y: y.floor() as i64,
            predicted_theta: theta,
            total_weight,
        });
        if total_weight > best_weight {
            best_weight = total_weight;
            best_index = id;
        }
    }

    (clusters, best_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, weight: f64) -> Particle {
        Particle {
            x,
            y,
            theta: 0.0,
            weight,
            cluster_id: 0,
        }
    }

    #[test]
    fn empty_population_yields_no_clusters() {
        let mut particles: Vec<Particle> = Vec::new();
        let (clusters, best) = cluster_and_estimate(&mut particles, 10, 10, 2.0);
        assert!(clusters.is_empty());
        assert_eq!(best, 0);
    }

    #[test]
    fn tightly_packed_particles_form_one_cluster() {
        let mut particles = vec![p(1.0, 1.0, 1.0), p(1.5, 1.2, 1.0), p(2.0, 0.8, 1.0)];
        let (clusters, best) = cluster_and_estimate(&mut particles, 10, 10, 5.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(best, 0);
        assert!(particles.iter().all(|p| p.cluster_id == 0));
    }

    #[test]
    fn far_apart_particles_form_distinct_clusters() {
        let mut particles = vec![p(0.0, 0.0, 1.0), p(90.0, 90.0, 1.0)];
        let (clusters, _best) = cluster_and_estimate(&mut particles, 100, 100, 10.0);
        assert_eq!(clusters.len(), 2);
        assert_ne!(particles[0].cluster_id, particles[1].cluster_id);
    }

    #[test]
    fn best_cluster_has_maximum_total_weight() {
        let mut particles = vec![
            p(0.0, 0.0, 0.2),
            p(0.0, 0.0, 0.2),
            p(90.0, 90.0, 5.0),
        ];
        let (clusters, best) = cluster_and_estimate(&mut particles, 100, 100, 10.0);
        let max_weight = clusters.iter().map(|c| c.total_weight).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(clusters[best].total_weight, max_weight);
    }

    #[test]
    fn ties_break_to_lower_id() {
        let mut particles = vec![p(0.0, 0.0, 1.0), p(90.0, 90.0, 1.0)];
        let (clusters, best) = cluster_and_estimate(&mut particles, 100, 100, 10.0);
        assert_eq!(clusters[0].total_weight, clusters[1].total_weight);
        assert_eq!(best, 0);
    }

    #[test]
    fn cluster_ids_are_in_range() {
        let mut particles = vec![p(0.0, 0.0, 1.0), p(1.0, 1.0, 1.0), p(90.0, 90.0, 1.0)];
        let (clusters, _) = cluster_and_estimate(&mut particles, 100, 100, 10.0);
        for particle in &particles {
            assert!(particle.cluster_id < clusters.len());
        }
    }
}
