//! parabench-metrics - Evaluation Metrics for Parabench
//!
//! Per-rank accumulators whose [`Metric::value`] reduces the running totals
//! across the data-parallel group.
//!
//! # Metrics
//! - [`Accuracy`]: top-1 accuracy; works on full logits or on 2D/3D
//!   tensor-parallel shards and gives the same answer either way
//! - [`Perplexity`]: `exp` of the mean per-batch loss
//!
//! # Example
//! ```rust
//! use parabench_distributed::ParallelContext;
//! use parabench_metrics::{Metric, MetricKind};
//! use parabench_tensor::{DType, Tensor};
//!
//! let ctx = ParallelContext::mock();
//! let mut metric = "acc".parse::<MetricKind>().unwrap().build(&ctx).unwrap();
//! let logits = Tensor::from_vec(vec![0.2, 0.8, 0.9, 0.1], &[2, 2], DType::F32).unwrap();
//! let targets = Tensor::from_slice(&[1.0, 1.0], DType::I64);
//! metric.forward(&logits, &targets, 0.0).unwrap();
//! assert_eq!(metric.value().unwrap(), 0.5);
//! ```
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accuracy;
pub mod error;
pub mod metric;
pub mod perplexity;
pub mod scheme;

pub use accuracy::Accuracy;
pub use error::{MetricError, MetricResult};
pub use metric::{Metric, MetricKind};
pub use perplexity::Perplexity;
pub use scheme::{AccuracyScheme, Counts};
