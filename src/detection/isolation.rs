//! Seeded isolation forest for unsupervised outlier detection.
//!
//! Each tree isolates a random subsample by recursively splitting on a random
//! feature at a random threshold. Points that are isolated in few splits get a
//! score close to 1.0; typical points score well below 0.5.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::detection::utility::percentile_sorted;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Model parameters. Identical config and input always give identical output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected fraction of outliers, in (0, 0.5].
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fits the forest on `rows`. Returns `None` with fewer than two rows or
    /// no features, since nothing can be isolated.
    pub fn fit(rows: &[Vec<f64>], config: &IsolationForestConfig) -> Option<Self> {
        if rows.len() < 2 || rows[0].is_empty() {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let sample_size = config.max_samples.clamp(2, rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..config.n_estimators.max(1))
            .map(|_| {
                let indices = sample(&mut rng, rows.len(), sample_size).into_vec();
                build_tree(rows, indices, 0, max_depth, &mut rng)
            })
            .collect();

        Some(Self { trees, sample_size })
    }

    /// Anomaly score per row in (0, 1]. Higher means more isolated.
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let norm = average_path_length(self.sample_size);
        rows.iter()
            .map(|row| {
                let total: f64 = self.trees.iter().map(|t| path_length(row, t, 0)).sum();
                let avg = total / self.trees.len() as f64;
                2f64.powf(-avg / norm)
            })
            .collect()
    }

    /// Flags the rows whose score falls in the top `contamination` fraction.
    pub fn predict_outliers(&self, rows: &[Vec<f64>], contamination: f64) -> Vec<bool> {
        let negated: Vec<f64> = self.score_samples(rows).iter().map(|s| -s).collect();

        let mut sorted = negated.clone();
        sorted.sort_by(f64::total_cmp);

        let contamination = contamination.clamp(f64::EPSILON, 0.5);
        let Some(offset) = percentile_sorted(&sorted, contamination * 100.0) else {
            return Vec::new();
        };

        negated.iter().map(|n| *n < offset).collect()
    }
}

/// Fits a forest on `rows` and returns the outlier mask in row order.
pub fn fit_predict(rows: &[Vec<f64>], config: &IsolationForestConfig) -> Vec<bool> {
    match IsolationForest::fit(rows, config) {
        Some(forest) => forest.predict_outliers(rows, config.contamination),
        None => vec![false; rows.len()],
    }
}

fn build_tree(
    rows: &[Vec<f64>],
    indices: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let mut features: Vec<usize> = (0..rows[0].len()).collect();
    features.shuffle(rng);

    for feature in features {
        let (min, max) = indices
            .iter()
            .map(|&i| rows[i][feature])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !min.is_finite() || !max.is_finite() || max <= min {
            continue;
        }

        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| rows[i][feature] <= threshold);

        return Node::Split {
            feature,
            threshold,
            left: Box::new(build_tree(rows, left, depth + 1, max_depth, rng)),
            right: Box::new(build_tree(rows, right, depth + 1, max_depth, rng)),
        };
    }

    // every feature is constant on this subsample
    Node::Leaf {
        size: indices.len(),
    }
}

fn path_length(row: &[f64], node: &Node, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if row[*feature] <= *threshold {
                left
            } else {
                right
            };
            path_length(row, next, depth + 1)
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_rows() -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let jitter = (i % 5) as f64;
                vec![10.0 + jitter, 100.0 + jitter * 2.0, 5.0 + jitter * 0.5]
            })
            .collect();
        rows.push(vec![90.0, 2_000.0, 80.0]);
        rows.push(vec![-60.0, 5_000.0, 150.0]);
        rows
    }

    #[test]
    fn test_extreme_points_are_flagged() {
        let rows = clustered_rows();
        let mask = fit_predict(&rows, &IsolationForestConfig::default());

        assert_eq!(mask.len(), rows.len());
        assert!(mask[40]);
        assert!(mask[41]);
        let flagged = mask.iter().filter(|m| **m).count();
        assert!(flagged <= 3, "flagged {flagged} rows");
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let rows = clustered_rows();
        let config = IsolationForestConfig::default();
        let a = IsolationForest::fit(&rows, &config).unwrap().score_samples(&rows);
        let b = IsolationForest::fit(&rows, &config).unwrap().score_samples(&rows);
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_rows_have_no_outliers() {
        let rows = vec![vec![1.0, 1.0]; 30];
        let mask = fit_predict(&rows, &IsolationForestConfig::default());
        assert!(mask.iter().all(|m| !m));
    }

    #[test]
    fn test_too_few_rows() {
        assert!(IsolationForest::fit(&[vec![1.0]], &IsolationForestConfig::default()).is_none());
        assert_eq!(fit_predict(&[], &IsolationForestConfig::default()), Vec::<bool>::new());
        assert_eq!(
            fit_predict(&[vec![3.0]], &IsolationForestConfig::default()),
            vec![false]
        );
    }

    #[test]
    fn test_infinite_feature_is_never_split() {
        let mut rows = clustered_rows();
        rows[3][1] = f64::INFINITY;
        rows[7][0] = f64::NEG_INFINITY;

        let mask = fit_predict(&rows, &IsolationForestConfig::default());
        assert_eq!(mask.len(), rows.len());
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
