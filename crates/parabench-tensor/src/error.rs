//! Error Types - Tensor Error Handling
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use thiserror::Error;

use crate::dtype::DType;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by tensor construction and tensor operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    /// Shape mismatch between tensors or between data and shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Data type mismatch between tensors.
    #[error("DType mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// The expected data type.
        expected: DType,
        /// The actual data type.
        actual: DType,
    },

    /// Invalid dimension index.
    #[error("Invalid dimension: index {index} for tensor with {ndim} dimensions")]
    InvalidDimension {
        /// The invalid dimension index.
        index: usize,
        /// Number of dimensions in the tensor.
        ndim: usize,
    },

    /// Slice range outside the dimension.
    #[error("Index out of bounds: range {start}..{end} for dimension of size {size}")]
    OutOfBounds {
        /// Range start.
        start: usize,
        /// Range end (exclusive).
        end: usize,
        /// Size of the dimension.
        size: usize,
    },

    /// Operation not supported on an empty tensor.
    #[error("Operation not supported on empty tensor")]
    EmptyTensor,

    /// Tensor does not hold exactly one element.
    #[error("Expected a single-element tensor, got {numel} elements")]
    NotScalar {
        /// Number of elements found.
        numel: usize,
    },
}

impl TensorError {
    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Result type for tensor operations.
pub type TensorResult<T> = Result<T, TensorError>;
