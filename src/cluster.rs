//! K-means clustering
//!
//! Lloyd's algorithm with k-means++ seeding. All randomness comes from a
//! `ChaCha8Rng` seeded per call, so identical input and seed give identical
//! assignments.

use crate::error::ComputeError;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// K-means parameters
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    pub k: usize,
    pub max_iterations: usize,
    /// Independent restarts; the lowest-inertia run wins
    pub n_init: usize,
    pub seed: u64,
}

/// Result of a k-means fit
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to assigned centroids
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeansFit {
    /// Member count per cluster
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &a in &self.assignments {
            sizes[a] += 1;
        }
        sizes
    }
}

impl KMeans {
    pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit, ComputeError> {
        if self.k == 0 {
            return Err(ComputeError::ClusteringFailed("k must be > 0".into()));
        }
        if data.len() < self.k {
            return Err(ComputeError::ClusteringFailed(format!(
                "{} points cannot form {} clusters",
                data.len(),
                self.k
            )));
        }
        let dim = data[0].len();
        if dim == 0 || data.iter().any(|p| p.len() != dim) {
            return Err(ComputeError::ClusteringFailed(
                "feature rows must share a non-zero width".into(),
            ));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ComputeError::ClusteringFailed(
                "feature matrix contains non-finite values".into(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..self.n_init.max(1) {
            let run = self.run_once(data, dim, &mut rng);
            let better = match &best {
                Some(b) => run.inertia < b.inertia,
                None => true,
            };
            if better {
                best = Some(run);
            }
        }

        best.ok_or_else(|| ComputeError::ClusteringFailed("no k-means run completed".into()))
    }

    fn run_once(&self, data: &[Vec<f64>], dim: usize, rng: &mut ChaCha8Rng) -> KMeansFit {
        let mut centroids = init_plus_plus(data, self.k, rng);
        let mut assignments = assign(data, &centroids, None);
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            iterations += 1;
            reseed_empty(data, &mut assignments, &centroids, self.k);
            centroids = recompute(data, &assignments, self.k, dim);

            let next = assign(data, &centroids, Some(&assignments));
            if next == assignments {
                break;
            }
            assignments = next;
        }

        reseed_empty(data, &mut assignments, &centroids, self.k);
        centroids = recompute(data, &assignments, self.k, dim);

        let inertia = data
            .iter()
            .zip(&assignments)
            .map(|(p, &a)| squared_distance(p, &centroids[a]))
            .sum();

        KMeansFit {
            assignments,
            centroids,
            inertia,
            iterations,
        }
    }
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// k-means++: first centroid uniform, the rest weighted by squared distance
fn init_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut nearest: Vec<f64> = data
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let idx = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = n - 1;
            for (i, d) in nearest.iter().enumerate() {
                cumulative += d;
                if cumulative > target {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };

        let centroid = data[idx].clone();
        for (p, d) in data.iter().zip(nearest.iter_mut()) {
            *d = d.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// Nearest centroid per point. With `previous`, a point only moves when
/// another centroid is strictly closer; otherwise ties go to the lowest index.
fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>], previous: Option<&[usize]>) -> Vec<usize> {
    data.iter()
        .enumerate()
        .map(|(i, p)| {
            let mut best = previous.map(|prev| prev[i]).unwrap_or(0);
            let mut best_dist = squared_distance(p, &centroids[best]);
            for (c, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(p, centroid);
                if d < best_dist {
                    best = c;
                    best_dist = d;
                }
            }
            best
        })
        .collect()
}

/// Give every empty cluster the point farthest from its current centroid,
/// taken only from clusters that keep at least one member.
fn reseed_empty(data: &[Vec<f64>], assignments: &mut [usize], centroids: &[Vec<f64>], k: usize) {
    let mut sizes = vec![0usize; k];
    for &a in assignments.iter() {
        sizes[a] += 1;
    }
    if sizes.iter().all(|&s| s > 0) {
        return;
    }

    let mut by_distance: Vec<(usize, f64)> = data
        .iter()
        .zip(assignments.iter())
        .enumerate()
        .map(|(i, (p, &a))| (i, squared_distance(p, &centroids[a])))
        .collect();
    by_distance.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut candidates = by_distance.into_iter();
    for cluster in 0..k {
        if sizes[cluster] > 0 {
            continue;
        }
        for (i, _) in candidates.by_ref() {
            let from = assignments[i];
            if sizes[from] > 1 {
                sizes[from] -= 1;
                sizes[cluster] += 1;
                assignments[i] = cluster;
                break;
            }
        }
    }
}

fn recompute(data: &[Vec<f64>], assignments: &[usize], k: usize, dim: usize) -> Vec<Vec<f64>> {
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &a) in data.iter().zip(assignments) {
        counts[a] += 1;
        for (s, v) in sums[a].iter_mut().zip(p) {
            *s += v;
        }
    }
    for (sum, count) in sums.iter_mut().zip(&counts) {
        if *count > 0 {
            for s in sum.iter_mut() {
                *s /= *count as f64;
            }
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for i in 0..6 {
            data.push(vec![0.0 + i as f64 * 0.1, 0.0]);
        }
        for i in 0..6 {
            data.push(vec![10.0 + i as f64 * 0.1, 10.0]);
        }
        data
    }

    fn kmeans(k: usize) -> KMeans {
        KMeans {
            k,
            max_iterations: 100,
            n_init: 5,
            seed: 42,
        }
    }

    #[test]
    fn test_separates_blobs() {
        let fit = kmeans(2).fit(&blobs()).unwrap();

        let first = fit.assignments[0];
        assert!(fit.assignments[..6].iter().all(|&a| a == first));
        assert!(fit.assignments[6..].iter().all(|&a| a != first));
        assert_eq!(fit.sizes(), vec![6, 6]);
        assert!(fit.inertia < 1.0);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = blobs();
        let a = kmeans(3).fit(&data).unwrap();
        let b = kmeans(3).fit(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_points_fill_every_cluster() {
        let data = vec![vec![1.0, 1.0]; 5];
        let fit = kmeans(3).fit(&data).unwrap();

        assert_eq!(fit.centroids.len(), 3);
        assert!(fit.sizes().iter().all(|&s| s > 0));
        assert_eq!(fit.inertia, 0.0);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            kmeans(3).fit(&[vec![1.0], vec![2.0]]),
            Err(ComputeError::ClusteringFailed(_))
        ));
        assert!(kmeans(1).fit(&[vec![f64::NAN]]).is_err());
        assert!(kmeans(0).fit(&blobs()).is_err());
    }
}
