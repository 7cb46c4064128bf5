//! Accuracy Schemes - Local Correct Counts per Tensor-Parallel Layout
//!
//! Each scheme answers one question: how many rows of this rank's batch were
//! classified correctly. The answer must not depend on how the logits were
//! sharded, so the sharded schemes reconcile their partial argmax across the
//! class shards before comparing to the targets.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::{reduce_sum, ParallelContext, ShardGrid, TensorParallelMode};
use parabench_tensor::{DType, Tensor};
use tracing::trace;

use crate::error::{MetricError, MetricResult};

// =============================================================================
// Counts
// =============================================================================

/// Correct predictions out of a number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    /// Rows whose prediction matched the target.
    pub correct: usize,
    /// Rows inspected.
    pub samples: usize,
}

// =============================================================================
// AccuracyScheme
// =============================================================================

/// How logits reach the accuracy metric.
#[derive(Debug, Clone)]
pub enum AccuracyScheme {
    /// Full logits on every rank.
    Unpartitioned,
    /// 1D tensor parallelism; logits are gathered before the metric.
    OneD,
    /// `q x q` grid: classes split along grid columns, rows along grid rows.
    TwoD(ShardGrid),
    /// `q x q x q` cube: classes split along the last axis, rows along the other two.
    ThreeD(ShardGrid),
}

impl AccuracyScheme {
    /// Selects the scheme for the context's tensor-parallel mode.
    pub fn from_context(ctx: &ParallelContext) -> MetricResult<Self> {
        let grid = || {
            ctx.grid().cloned().ok_or_else(|| {
                MetricError::Precondition(format!(
                    "{} tensor parallelism without a shard grid",
                    ctx.mode()
                ))
            })
        };
        Ok(match ctx.mode() {
            TensorParallelMode::None => Self::Unpartitioned,
            TensorParallelMode::OneD => Self::OneD,
            TensorParallelMode::TwoD => Self::TwoD(grid()?),
            TensorParallelMode::ThreeD => Self::ThreeD(grid()?),
        })
    }

    /// Short name of the scheme.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unpartitioned => "none",
            Self::OneD => "1d",
            Self::TwoD(_) => "2d",
            Self::ThreeD(_) => "3d",
        }
    }

    /// Counts correct rows of the local logits shard.
    ///
    /// For the sharded schemes every member of the tensor-parallel group must
    /// call this in lockstep, and the returned counts cover all rows held by
    /// the group.
    pub fn local_correct(&self, logits: &Tensor, targets: &Tensor) -> MetricResult<Counts> {
        match self {
            Self::Unpartitioned | Self::OneD => full_correct(logits, targets),
            Self::TwoD(grid) | Self::ThreeD(grid) => sharded_correct(grid, logits, targets),
        }
    }
}

fn check_rows(logits: &Tensor, targets: &Tensor) -> MetricResult<usize> {
    let rows = logits.rows();
    if rows != targets.numel() {
        return Err(MetricError::Precondition(format!(
            "logits hold {rows} rows but targets hold {} labels",
            targets.numel()
        )));
    }
    Ok(rows)
}

fn count_matches(predictions: impl Iterator<Item = usize>, targets: &Tensor) -> usize {
    predictions
        .zip(targets.as_slice())
        .filter(|&(p, &t)| t >= 0.0 && p == t as usize)
        .count()
}

fn full_correct(logits: &Tensor, targets: &Tensor) -> MetricResult<Counts> {
    let rows = check_rows(logits, targets)?;
    let predictions = logits.argmax_last()?;
    Ok(Counts {
        correct: count_matches(predictions.into_iter(), targets),
        samples: rows,
    })
}

fn sharded_correct(grid: &ShardGrid, logits: &Tensor, targets: &Tensor) -> MetricResult<Counts> {
    let rows = check_rows(logits, targets)?;
    let offset = grid.class_shard * logits.last_dim();

    // (value, global class index) of each row's local maximum
    let mut pairs = Vec::with_capacity(rows * 2);
    for (value, index) in logits.max_last()? {
        pairs.push(value);
        pairs.push((offset + index) as f64);
    }
    let local = Tensor::from_vec(pairs, &[rows, 2], DType::F64)?;
    let shards = grid.class_group.all_gather_tensor(&local)?;

    // shards arrive in class order, so a strict comparison keeps the lowest index on ties;
    // NaN loses to any number, as in the unpartitioned argmax
    let mut shards = shards.iter().map(|shard| {
        shard
            .as_slice()
            .chunks(2)
            .map(|pair| (pair[0], pair[1] as usize))
            .collect::<Vec<_>>()
    });
    let mut best = shards.next().unwrap_or_default();
    for shard in shards {
        for (slot, (value, index)) in best.iter_mut().zip(shard) {
            let wins = value > slot.0
                || (slot.0.is_nan() && !value.is_nan())
                || (value == slot.0 && index < slot.1);
            if wins {
                *slot = (value, index);
            }
        }
    }
    let correct = count_matches(best.into_iter().map(|(_, i)| i), targets);
    trace!(correct, rows, class_shard = grid.class_shard, "sharded accuracy");

    let counts = Tensor::from_slice(&[correct as f64, rows as f64], DType::F64);
    let counts = reduce_sum(counts, &grid.batch_group)?;
    let values = counts.as_slice();
    Ok(Counts {
        correct: values[0] as usize,
        samples: values[1] as usize,
    })
}

// =============================================================================
// Tests
// =============================================================================
