//! Metric - Accumulator Interface and Selection
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::str::FromStr;

use parabench_distributed::ParallelContext;
use parabench_tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::accuracy::Accuracy;
use crate::error::{MetricError, MetricResult};
use crate::perplexity::Perplexity;

// =============================================================================
// Metric Trait
// =============================================================================

/// A statistic accumulated over an epoch and reduced across data-parallel replicas.
///
/// Every rank of the data-parallel group must call [`value`](Metric::value)
/// together: it issues a collective.
pub trait Metric: Send {
    /// Display name of the metric.
    fn name(&self) -> &'static str;

    /// Clears the running totals.
    fn reset(&mut self);

    /// Folds one batch into the running totals and returns the batch-local value.
    fn forward(&mut self, logits: &Tensor, targets: &Tensor, loss: f64) -> MetricResult<f64>;

    /// Globally reduced value of everything seen since the last reset.
    ///
    /// Leaves the local totals untouched, so it may be called repeatedly.
    fn value(&self) -> MetricResult<f64>;
}

// =============================================================================
// MetricKind
// =============================================================================

/// Evaluation metric selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Top-1 classification accuracy.
    #[default]
    #[serde(alias = "acc")]
    Accuracy,
    /// Exponentiated mean loss.
    #[serde(alias = "ppl")]
    Perplexity,
}

impl MetricKind {
    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Perplexity => "perplexity",
        }
    }

    /// Builds the accumulator for this rank.
    pub fn build(self, ctx: &ParallelContext) -> MetricResult<Box<dyn Metric>> {
        Ok(match self {
            Self::Accuracy => Box::new(Accuracy::new(ctx)?),
            Self::Perplexity => Box::new(Perplexity::new(ctx)),
        })
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acc" | "accuracy" => Ok(Self::Accuracy),
            "ppl" | "perplexity" => Ok(Self::Perplexity),
            _ => Err(MetricError::UnknownMetric(s.to_string())),
        }
    }
}
