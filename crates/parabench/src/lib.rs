//! # Parabench - Distributed Training Benchmark Harness
//!
//! Parabench runs a training/evaluation workload across the ranks of a
//! data-parallel and tensor-parallel world and reports, per epoch, the loss,
//! throughput, achieved TFLOPS, the evaluation metric and (optionally) how
//! much time and bandwidth went into collective communication.
//!
//! ## Crates
//!
//! - [`tensor`]: the minimal tensor the collectives and metrics operate on
//! - [`distributed`]: backends, process groups and the parallel layout
//! - [`profile`]: the communication profiler and its backend decorator
//! - [`metrics`]: accuracy and perplexity, aggregated across ranks
//!
//! ## This crate
//!
//! - [`TrainConfig`]: run configuration, loadable from TOML
//! - [`Workload`]: model + data + optimizer seen by the loops, with two
//!   synthetic implementations
//! - [`train_epoch`] / [`eval_epoch`] / [`run_benchmark`]: the epoch loops
//! - [`GradScaler`]: dynamic loss scaling for mixed precision
//! - [`LrScheduler`]: constant, warmup and cosine learning-rate schedules
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use parabench::prelude::*;
//!
//! let config = TrainConfig::new()
//!     .batch_size(8)
//!     .steps_per_epoch(2)
//!     .comm_profiler(true);
//! let mut ctx = TrainingContext::new(Arc::new(MockBackend::single()), config).unwrap();
//! let reports = run_benchmark(&mut ctx, &mut ()).unwrap();
//! assert_eq!(reports.len(), 2);
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
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::doc_markdown)]

// =============================================================================
// Re-exports
// =============================================================================

pub use parabench_distributed as distributed;
pub use parabench_metrics as metrics;
pub use parabench_profile as profile;
pub use parabench_tensor as tensor;

pub mod benchmark;
pub mod config;
pub mod error;
pub mod scaler;
pub mod schedule;
pub mod trainer;
pub mod workload;

pub use benchmark::{calc_tflops, format_param_count, throughput};
pub use config::{ModelKind, ModelShape, TrainConfig};
pub use error::{TrainError, TrainResult};
pub use scaler::{GradScaler, ScalerConfig};
pub use schedule::{LrSchedule, LrScheduler};
pub use trainer::{
    eval_epoch, run_benchmark, train_epoch, EpochReport, StepObserver, StepStats, TrainingContext,
};
pub use workload::{
    build_workload, Split, StepOutput, SyntheticClassifier, SyntheticLanguageModel, Workload,
};

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for driving a benchmark.
pub mod prelude {
    pub use crate::{
        eval_epoch, run_benchmark, train_epoch, EpochReport, GradScaler, LrSchedule, ModelKind,
        Split, StepObserver, StepStats, TrainConfig, TrainError, TrainResult, TrainingContext,
        Workload,
    };

    pub use parabench_distributed::{
        Backend, MockBackend, ParallelContext, ProcessGroup, TensorParallelMode,
    };
    pub use parabench_metrics::{Metric, MetricKind};
    pub use parabench_profile::{CommProfiler, CommStats, MemoryTracker, ProfilingBackend};
    pub use parabench_tensor::{DType, Tensor};
}
