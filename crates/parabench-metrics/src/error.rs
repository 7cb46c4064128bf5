//! Error types for metric accumulators.

use parabench_distributed::CommError;
use parabench_tensor::TensorError;
use thiserror::Error;

/// Result type for metric operations.
pub type MetricResult<T> = Result<T, MetricError>;

/// Error types for metric operations.
#[derive(Error, Debug)]
pub enum MetricError {
    /// A metric was read or fed in a state where the result is undefined.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Unknown metric name.
    #[error("Unknown metric '{0}' (expected acc, accuracy, ppl or perplexity)")]
    UnknownMetric(String),

    /// Failure of a reduction collective.
    #[error("Communication error: {0}")]
    Comm(#[from] CommError),

    /// Malformed logits or targets.
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}
