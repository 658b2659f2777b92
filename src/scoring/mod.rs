//! Anomaly Scoring
//!
//! Fits one unsupervised isolation forest over the full feature matrix for
//! the batch and labels every row anomaly (-1) or normal (1). Normality is
//! relative to the current batch's distribution; re-running with a
//! different batch composition can legitimately change which events are
//! flagged. That batch-global behavior is intentional.

pub mod forest;
pub mod scorer;

pub use forest::{IsolationForest, IsolationForestParams};
pub use scorer::{score_batch, ScoreOutcome};
