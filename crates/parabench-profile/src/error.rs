//! Error types for the profiling module.

use thiserror::Error;

/// Result type for profiling operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Error types for profiling operations.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Invalid profiler state (start while started, stop while stopped).
    #[error("Invalid profiler state: {0}")]
    InvalidState(String),
}
