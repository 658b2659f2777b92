//! Isolation Forest
//!
//! Seeded, in-process implementation of the standard isolation forest:
//! random axis-aligned splits isolate outliers in fewer steps than inliers,
//! and the normalized path length 2^(-E[h]/c(psi)) becomes the anomaly
//! score in (0, 1]. Every random draw goes through one StdRng seeded from
//! the run configuration, so identical input and seed reproduce identical
//! scores.

use rand::prelude::*;

use crate::features::FEATURE_COUNT;

/// Euler-Mascheroni constant, for the harmonic-number approximation
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

// ============================================================================
// PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct IsolationForestParams {
    pub trees: usize,
    /// Per-tree subsample cap; the effective size is min(cap, n)
    pub max_samples: usize,
    pub seed: u64,
}

// ============================================================================
// TREE
// ============================================================================

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

// ============================================================================
// FOREST
// ============================================================================

#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit on the entire batch at once. Errors on a degenerate matrix:
    /// empty, or without variance in any feature column.
    pub fn fit(
        data: &[[f64; FEATURE_COUNT]],
        params: IsolationForestParams,
    ) -> Result<Self, String> {
        if data.is_empty() {
            return Err("empty feature matrix".to_string());
        }
        let first = &data[0];
        if data.iter().all(|row| row == first) {
            return Err("no variance in any feature column".to_string());
        }

        let n = data.len();
        let sample_size = params.max_samples.min(n).max(2);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                build_node(data, sample, 0, max_depth, &mut rng)
            })
            .collect();

        Ok(Self { trees, sample_size })
    }

    /// Anomaly score for one row; higher means more isolated.
    pub fn score(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| path_length(t, row, 0)).sum();
        let mean = total / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean / c)
    }

    pub fn scores(&self, data: &[[f64; FEATURE_COUNT]]) -> Vec<f64> {
        data.iter().map(|row| self.score(row)).collect()
    }
}

// ============================================================================
// TREE CONSTRUCTION
// ============================================================================

fn build_node(
    data: &[[f64; FEATURE_COUNT]],
    indices: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if indices.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: indices.len() };
    }

    // Only features that actually vary inside this node are splittable
    let mut candidates = Vec::new();
    for feature in 0..FEATURE_COUNT {
        let (min, max) = min_max(data, &indices, feature);
        if max > min {
            candidates.push((feature, min, max));
        }
    }
    if candidates.is_empty() {
        return Node::Leaf { size: indices.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&i| data[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, left, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, right, depth + 1, max_depth, rng)),
    }
}

fn min_max(data: &[[f64; FEATURE_COUNT]], indices: &[usize], feature: usize) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &i in indices {
        let v = data[i][feature];
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    (min, max)
}

// ============================================================================
// PATH LENGTH
// ============================================================================

fn path_length(node: &Node, row: &[f64; FEATURE_COUNT], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if row[*feature] < *threshold { left } else { right };
            path_length(next, row, depth + 1)
        }
    }
}

/// c(n): expected path length of an unsuccessful BST search over n points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
