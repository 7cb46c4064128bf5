//! Parabench Tensor - Engine Tensor Handle
//!
//! The benchmark harness never computes with tensors itself; it measures and
//! reduces tensors owned by an external compute engine. This crate provides
//! the minimal handle that the communication, profiling and metric layers
//! need: element type, shape, byte size and a handful of elementwise ops.
//!
//! # Example
//! ```rust
//! use parabench_tensor::{DType, Tensor};
//!
//! let t = Tensor::zeros(&[1024], DType::F32);
//! assert_eq!(t.nbytes(), 4096);
//! ```
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]

pub mod dtype;
pub mod error;
pub mod tensor;

// =============================================================================
// Re-exports
// =============================================================================

pub use dtype::DType;
pub use error::{TensorError, TensorResult};
pub use tensor::Tensor;
