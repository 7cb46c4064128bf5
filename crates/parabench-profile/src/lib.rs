//! parabench-profile - Communication Profiling for Parabench
//!
//! Measures how many bytes a rank moves through collectives and how long it
//! spends waiting on them.
//!
//! # Key Features
//! - Throughput model: modelled bytes per collective (ring all-reduce,
//!   all-gather, reduce-scatter, rooted broadcast/reduce)
//! - Busy-time tracking: overlapping collectives are timed as one span
//! - Backend decorator: wrap the real backend once, toggle recording with
//!   `start()` / `stop()`
//! - Async handles: asynchronous collectives stay open until awaited
//! - Memory tracking: peak resident buffer bytes per epoch
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use parabench_distributed::{Backend, MockBackend, ProcessGroup, all_reduce_sum};
//! use parabench_profile::{CommProfiler, ProfilingBackend};
//! use parabench_tensor::{DType, Tensor};
//!
//! let profiler = CommProfiler::new();
//! let backend = ProfilingBackend::new(Arc::new(MockBackend::single()), profiler.clone());
//! let pg = ProcessGroup::new(Arc::new(backend));
//!
//! let window = profiler.window().unwrap();
//! let mut t = Tensor::zeros(&[1024], DType::F32);
//! all_reduce_sum(&mut t, &pg).unwrap();
//! let stats = window.finish().unwrap();
//! assert_eq!(stats.count, 1);
//! ```
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod profiler;
pub mod report;
pub mod session;
pub mod volume;

pub use backend::{CommHandle, ProfilingBackend};
pub use error::{ProfileError, ProfileResult};
pub use memory::{MemoryStats, MemoryTracker};
pub use profiler::{CommProfiler, ProfileWindow};
pub use report::{CommStats, EPSILON};
pub use session::{PendingCollective, ProfilingSession};
pub use volume::{
    all_gather_volume, all_reduce_volume, broadcast_volume, reduce_scatter_volume, reduce_volume,
    CollectiveKind,
};

/// Opens a profiling window for the rest of the enclosing scope.
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr) => {
        let _window = $profiler.window()?;
    };
}
