//! Parabench Distributed - Collective Communication Layer
//!
//! Everything the benchmark harness needs to talk to the other ranks of a
//! data-parallel / tensor-parallel run.
//!
//! # Features
//!
//! ## Communication
//! - **Backend trait** with the five profiled collectives (all-reduce,
//!   all-gather, reduce-scatter, broadcast, reduce) plus barrier, each
//!   optionally asynchronous with a [`Work`] completion handle
//! - **Process groups** scoping collectives to a subset of ranks
//! - **Parallel context** laying out global, data-parallel and
//!   tensor-parallel groups (none / 1D / 2D / 3D)
//!
//! ## Reduction
//! - [`reduce_sum`] / [`reduce_mean`] aggregate statistics across the
//!   data-parallel group, with a no-op fast path for single-rank groups
//!
//! ## Backends
//! - [`MockBackend`] simulates a multi-rank world in one process (one thread
//!   per rank) with blocking rendezvous semantics
//!
//! # Example
//!
//! ```rust
//! use parabench_distributed::{reduce_mean, ProcessGroup};
//! use parabench_tensor::{DType, Tensor};
//!
//! let pg = ProcessGroup::mock();
//! let loss = reduce_mean(Tensor::scalar(2.5, DType::F32), &pg).unwrap();
//! assert_eq!(loss.item().unwrap(), 2.5);
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
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::doc_markdown)]

pub mod backend;
pub mod comm;
pub mod error;
pub mod parallel;
pub mod process_group;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Backend, CompletedWork, MockBackend, ReduceOp, Work, WorkResult};
pub use comm::{
    all_gather, all_reduce_max, all_reduce_min, all_reduce_sum, barrier, broadcast,
    broadcast_from, is_main_process, reduce_mean, reduce_mean_scalar, reduce_scatter_sum,
    reduce_sum, reduce_sum_scalar,
};
pub use error::{CommError, CommResult};
pub use parallel::{ParallelContext, ShardGrid, TensorParallelMode};
pub use process_group::ProcessGroup;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for distributed code.
pub mod prelude {
    pub use crate::{
        // Communication
        all_gather,
        all_reduce_sum,
        barrier,
        broadcast,
        reduce_mean,
        reduce_sum,
        // Backend
        Backend,
        CommError,
        CommResult,
        MockBackend,
        // Groups
        ParallelContext,
        ProcessGroup,
        ReduceOp,
        TensorParallelMode,
        Work,
    };

    pub use parabench_tensor::{DType, Tensor};
}

// =============================================================================
// Tests
// =============================================================================
