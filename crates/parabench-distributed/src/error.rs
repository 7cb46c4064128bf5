//! Error - Communication Error Types
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_tensor::TensorError;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by communication backends and process groups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    /// The calling rank (or a named src/dst rank) is not part of the group.
    #[error("Rank {rank} is not a member of group {group:?}")]
    RankNotInGroup {
        /// The offending rank.
        rank: usize,
        /// Ranks of the group.
        group: Vec<usize>,
    },

    /// Group description is unusable.
    #[error("Invalid process group: {0}")]
    InvalidGroup(String),

    /// Number of per-rank buffers does not match the group size.
    #[error("Buffer count mismatch: expected {expected} per-rank buffers, got {actual}")]
    BufferCount {
        /// Group size.
        expected: usize,
        /// Buffers supplied.
        actual: usize,
    },

    /// Invalid configuration or argument (precondition violation).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure inside the communication substrate.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Tensor-level failure while packing or unpacking buffers.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Result type for communication operations.
pub type CommResult<T> = Result<T, CommError>;
