//! Error handling
//!
//! Run-level failure taxonomy. Source-level and record-level failures are
//! absorbed inside the readers (logged and counted); only total absence of
//! usable data or an unrecoverable scoring failure surfaces here.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Zero rows from all sources combined. Nothing is written so an
    /// empty artifact can never be confused with a failed run.
    #[error("no events found in any configured source")]
    NoData,

    /// The outlier model could not be fit (degenerate feature matrix).
    /// Fatal for the scoring stage only; the unified table still exists.
    #[error("model fit failed: {0}")]
    ModelFit(String),

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Artifact persistence failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
