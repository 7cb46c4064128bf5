//! Error - Training Error Types
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::CommError;
use parabench_metrics::MetricError;
use parabench_profile::ProfileError;
use parabench_tensor::TensorError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while setting up or running a benchmark.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collective failure.
    #[error(transparent)]
    Comm(#[from] CommError),

    /// Profiler misuse.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Metric failure.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// Malformed tensor.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Result type for training operations.
pub type TrainResult<T> = Result<T, TrainError>;
