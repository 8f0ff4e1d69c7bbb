//! Isolation forest
//!
//! Random axis-aligned partitioning; points that isolate in few splits are
//! unusual. Trees are built from sub-samples drawn with a per-call seeded
//! `ChaCha8Rng`.

use crate::error::ComputeError;
use crate::numeric::quantile_sorted;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Isolation forest parameters
#[derive(Debug, Clone, Copy)]
pub struct IsolationForest {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected fraction of outliers, in (0, 0.5]
    pub contamination: f64,
    pub seed: u64,
}

/// Per-point anomaly scores and flags
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationScores {
    /// Score in (0, 1]; higher is more anomalous
    pub scores: Vec<f64>,
    pub threshold: f64,
    pub flags: Vec<bool>,
}

impl IsolationScores {
    pub fn flagged(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(|(i, _)| i)
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    /// Build the forest on `data` and score every point in it
    pub fn fit_predict(&self, data: &[Vec<f64>]) -> Result<IsolationScores, ComputeError> {
        let n = data.len();
        if n < 2 {
            return Err(ComputeError::OutlierDetectionFailed(
                "at least two points are required".into(),
            ));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ComputeError::OutlierDetectionFailed(
                "feature matrix contains non-finite values".into(),
            ));
        }
        if self.n_trees == 0 {
            return Err(ComputeError::OutlierDetectionFailed(
                "forest needs at least one tree".into(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let psi = self.max_samples.min(n).max(2);
        let height_limit = (psi as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..self.n_trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                build(data, sample, 0, height_limit, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(psi);
        let scores: Vec<f64> = data
            .iter()
            .map(|point| {
                let total: f64 = trees.iter().map(|t| path_length(t, point, 0)).sum();
                let expected = total / trees.len() as f64;
                if normalizer > 0.0 {
                    2f64.powf(-expected / normalizer)
                } else {
                    0.5
                }
            })
            .collect();

        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let threshold = quantile_sorted(&sorted, 1.0 - self.contamination).ok_or_else(|| {
            ComputeError::OutlierDetectionFailed("no scores to threshold".into())
        })?;

        let flags = scores.iter().map(|s| *s > threshold).collect();
        Ok(IsolationScores {
            scores,
            threshold,
            flags,
        })
    }
}

fn build(
    data: &[Vec<f64>],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // only features that still vary can split
    let n_features = data[indices[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..n_features)
        .filter_map(|f| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][f]), hi.max(data[i][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let value = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| data[i][feature] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(build(data, left, depth + 1, height_limit, rng)),
        right: Box::new(build(data, right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            value,
            left,
            right,
        } => {
            if point[*feature] < *value {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// Average unsuccessful-search path length in a BST of `n` nodes, c(n)
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_MASCHERONI;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> IsolationForest {
        IsolationForest {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }

    fn data_with_outlier() -> Vec<Vec<f64>> {
        let mut data: Vec<Vec<f64>> = (0..19)
            .map(|i| vec![(i % 5) as f64 * 0.1, (i % 3) as f64 * 0.1])
            .collect();
        data.push(vec![8.0, -6.0]);
        data
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is roughly 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_outlier_scores_highest() {
        let result = forest().fit_predict(&data_with_outlier()).unwrap();

        let max_idx = result
            .scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, 19);
        assert!(result.flags[19]);
        assert!(result.flagged().count() <= 2);
        assert!(result.scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = data_with_outlier();
        assert_eq!(
            forest().fit_predict(&data).unwrap(),
            forest().fit_predict(&data).unwrap()
        );
    }

    #[test]
    fn test_identical_points_flag_nothing() {
        let data = vec![vec![0.0, 0.0, 0.0]; 12];
        let result = forest().fit_predict(&data).unwrap();
        assert_eq!(result.flagged().count(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(forest().fit_predict(&[vec![1.0]]).is_err());
        assert!(forest().fit_predict(&[vec![1.0], vec![f64::NAN]]).is_err());
    }
}
