//! Batch Scorer
//!
//! Bridges the feature matrix to the isolation forest and converts scores
//! into the persisted label convention: -1 = anomaly, 1 = normal. The
//! contamination parameter calibrates how many of the batch's top scorers
//! get flagged.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::features::FeatureMatrix;

use super::forest::{IsolationForest, IsolationForestParams};

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug)]
pub struct ScoreOutcome {
    /// One label per matrix row: -1 anomaly, 1 normal
    pub labels: Vec<i8>,
    /// Raw anomaly scores, aligned with labels
    pub scores: Vec<f64>,
}

impl ScoreOutcome {
    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == -1).count()
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// Fit on the whole batch and label every row.
///
/// A degenerate matrix is fatal for this stage only; the caller keeps the
/// already-persisted unified table either way.
pub fn score_batch(matrix: &FeatureMatrix, config: &PipelineConfig) -> PipelineResult<ScoreOutcome> {
    let n = matrix.n_rows();
    if n == 0 {
        return Err(PipelineError::ModelFit("empty feature matrix".to_string()));
    }
    if n == 1 {
        // One row has no batch distribution to be anomalous against
        return Ok(ScoreOutcome {
            labels: vec![1],
            scores: vec![0.0],
        });
    }

    let params = IsolationForestParams {
        trees: config.trees,
        max_samples: config.max_samples,
        seed: config.seed,
    };
    let forest = IsolationForest::fit(&matrix.rows, params).map_err(PipelineError::ModelFit)?;
    let scores = forest.scores(&matrix.rows);

    // Flag the top contamination fraction; ties broken by row index so the
    // labeling is deterministic for a fixed seed and input.
    let flagged = ((config.contamination * n as f64).floor() as usize).min(n);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut labels = vec![1i8; n];
    for &i in order.iter().take(flagged) {
        labels[i] = -1;
    }

    Ok(ScoreOutcome { labels, scores })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(contamination: f64) -> PipelineConfig {
        PipelineConfig {
            contamination,
            seed: 42,
            trees: 50,
            max_samples: 256,
            ..Default::default()
        }
    }

    fn matrix(rows: usize) -> FeatureMatrix {
        let rows = (0..rows)
            .map(|i| {
                let v = (i % 7) as f64;
                [v, v + 1.0, v * 10.0, 53.0, v, 0.0, 100.0 + v]
            })
            .collect();
        FeatureMatrix { rows }
    }

    #[test]
    fn test_contamination_flags_expected_count() {
        let outcome = score_batch(&matrix(10), &config(0.2)).unwrap();
        assert_eq!(outcome.labels.len(), 10);
        assert_eq!(outcome.anomaly_count(), 2);
        assert!(outcome.labels.iter().all(|&l| l == 1 || l == -1));
    }

    #[test]
    fn test_anomaly_count_never_exceeds_rows() {
        for n in [1usize, 2, 5, 25] {
            let outcome = score_batch(&matrix(n), &config(0.5)).unwrap();
            assert!(outcome.anomaly_count() <= n);
            assert_eq!(outcome.labels.len(), n);
        }
    }

    #[test]
    fn test_zero_contamination_flags_nothing() {
        let outcome = score_batch(&matrix(10), &config(0.0)).unwrap();
        assert_eq!(outcome.anomaly_count(), 0);
    }

    #[test]
    fn test_single_row_is_normal() {
        let outcome = score_batch(&matrix(1), &config(0.2)).unwrap();
        assert_eq!(outcome.labels, vec![1]);
    }

    #[test]
    fn test_empty_matrix_is_fit_failure() {
        let err = score_batch(&FeatureMatrix::default(), &config(0.2));
        assert!(matches!(err, Err(PipelineError::ModelFit(_))));
    }

    #[test]
    fn test_constant_matrix_is_fit_failure() {
        let m = FeatureMatrix {
            rows: vec![[1.0; crate::features::FEATURE_COUNT]; 8],
        };
        let err = score_batch(&m, &config(0.2));
        assert!(matches!(err, Err(PipelineError::ModelFit(_))));
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let m = matrix(20);
        let a = score_batch(&m, &config(0.2)).unwrap();
        let b = score_batch(&m, &config(0.2)).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.scores, b.scores);
    }
}
