//! Parallel Context - Process Group Layout for Hybrid Parallelism
//!
//! Splits the world into tensor-parallel blocks and data-parallel groups and,
//! for the 2D and 3D tensor-parallel layouts, derives the sub-groups across
//! which a logits tensor's batch and class dimensions are sharded.
//!
//! Layout for a world of `W` ranks and tensor-parallel size `T`:
//! - tensor groups are contiguous blocks `[b*T, (b+1)*T)`;
//! - data groups are the strided sets `{t, t+T, t+2T, ...}`.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parabench_tensor::Tensor;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{Backend, MockBackend};
use crate::error::{CommError, CommResult};
use crate::process_group::ProcessGroup;

// =============================================================================
// Tensor-Parallel Mode
// =============================================================================

/// How the class/vocabulary dimension of the logits is sharded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TensorParallelMode {
    /// No tensor parallelism.
    #[default]
    #[serde(rename = "none")]
    None,
    /// 1D tensor parallelism (logits are gathered before the metric sees them).
    #[serde(rename = "1d")]
    OneD,
    /// 2D (SUMMA-style) `q x q` grid.
    #[serde(rename = "2d")]
    TwoD,
    /// 3D `q x q x q` cube.
    #[serde(rename = "3d")]
    ThreeD,
}

impl TensorParallelMode {
    /// Returns the canonical name of the mode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OneD => "1d",
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
        }
    }
}

impl fmt::Display for TensorParallelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TensorParallelMode {
    type Err = CommError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "1d" => Ok(Self::OneD),
            "2d" => Ok(Self::TwoD),
            "3d" => Ok(Self::ThreeD),
            other => Err(CommError::InvalidArgument(format!(
                "unrecognized tensor-parallel mode '{other}' (expected none, 1d, 2d or 3d)"
            ))),
        }
    }
}

// =============================================================================
// Shard Grid
// =============================================================================

/// Sub-groups over which a sharded logits tensor is split.
///
/// `class_group` holds the ranks that own different class shards of the same
/// rows; `batch_group` holds the ranks that own the same class shard of
/// different rows.
#[derive(Debug, Clone)]
pub struct ShardGrid {
    /// Ranks sharing this rank's rows, one per class shard.
    pub class_group: ProcessGroup,
    /// Ranks sharing this rank's class shard, one per row shard.
    pub batch_group: ProcessGroup,
    /// Index of this rank's class shard.
    pub class_shard: usize,
    /// Index of this rank's row shard.
    pub batch_shard: usize,
}

impl ShardGrid {
    /// Number of class shards.
    #[must_use]
    pub fn class_shards(&self) -> usize {
        self.class_group.size()
    }

    /// Number of row shards.
    #[must_use]
    pub fn batch_shards(&self) -> usize {
        self.batch_group.size()
    }

    /// Cuts this rank's shard out of full logits `[batch, ..., classes]` and
    /// targets `[batch, ...]`.
    pub fn local_shard(&self, logits: &Tensor, targets: &Tensor) -> CommResult<(Tensor, Tensor)> {
        let class_dim = logits.ndim().checked_sub(1).ok_or_else(|| {
            CommError::InvalidArgument("logits must have at least one dimension".to_string())
        })?;
        let logits = logits
            .chunk(0, self.batch_shards(), self.batch_shard)?
            .chunk(class_dim, self.class_shards(), self.class_shard)?;
        let targets = targets.chunk(0, self.batch_shards(), self.batch_shard)?;
        Ok((logits, targets))
    }
}

// =============================================================================
// Parallel Context
// =============================================================================

/// Process groups of one rank in a data + tensor parallel run.
#[derive(Debug, Clone)]
pub struct ParallelContext {
    global: ProcessGroup,
    data: ProcessGroup,
    tensor: ProcessGroup,
    mode: TensorParallelMode,
    grid: Option<ShardGrid>,
}

impl ParallelContext {
    /// Builds the group layout for this rank.
    pub fn new(
        backend: Arc<dyn Backend>,
        mode: TensorParallelMode,
        tensor_parallel_size: usize,
    ) -> CommResult<Self> {
        let world = backend.world_size();
        let rank = backend.rank();
        let tp = tensor_parallel_size;

        if tp == 0 {
            return Err(CommError::InvalidArgument(
                "tensor-parallel size must be at least 1".to_string(),
            ));
        }
        if mode == TensorParallelMode::None && tp != 1 {
            return Err(CommError::InvalidArgument(format!(
                "tensor-parallel size {tp} requires a tensor-parallel mode"
            )));
        }
        if world % tp != 0 {
            return Err(CommError::InvalidArgument(format!(
                "world size {world} is not divisible by tensor-parallel size {tp}"
            )));
        }

        let dp = world / tp;
        let base = (rank / tp) * tp;
        let local = rank % tp;

        let global = ProcessGroup::new(Arc::clone(&backend));
        let data = ProcessGroup::with_ranks(
            Arc::clone(&backend),
            (0..dp).map(|b| b * tp + local).collect(),
        );
        let tensor = ProcessGroup::with_ranks(Arc::clone(&backend), (base..base + tp).collect());

        let grid = match mode {
            TensorParallelMode::None | TensorParallelMode::OneD => None,
            TensorParallelMode::TwoD => {
                let q = exact_root(tp, 2).ok_or_else(|| {
                    CommError::InvalidArgument(format!(
                        "2d tensor parallelism needs a square size, got {tp}"
                    ))
                })?;
                let (row, col) = (local / q, local % q);
                Some(ShardGrid {
                    class_group: ProcessGroup::with_ranks(
                        Arc::clone(&backend),
                        (0..q).map(|c| base + row * q + c).collect(),
                    ),
                    batch_group: ProcessGroup::with_ranks(
                        Arc::clone(&backend),
                        (0..q).map(|r| base + r * q + col).collect(),
                    ),
                    class_shard: col,
                    batch_shard: row,
                })
            }
            TensorParallelMode::ThreeD => {
                let q = exact_root(tp, 3).ok_or_else(|| {
                    CommError::InvalidArgument(format!(
                        "3d tensor parallelism needs a cubic size, got {tp}"
                    ))
                })?;
                let (a, b, c) = (local / (q * q), (local / q) % q, local % q);
                Some(ShardGrid {
                    class_group: ProcessGroup::with_ranks(
                        Arc::clone(&backend),
                        (0..q).map(|cc| base + a * q * q + b * q + cc).collect(),
                    ),
                    batch_group: ProcessGroup::with_ranks(
                        Arc::clone(&backend),
                        (0..q * q).map(|ab| base + ab * q + c).collect(),
                    ),
                    class_shard: c,
                    batch_shard: a * q + b,
                })
            }
        };

        debug!(
            rank,
            world,
            data_parallel = dp,
            tensor_parallel = tp,
            %mode,
            "initialized parallel context"
        );

        Ok(Self {
            global,
            data,
            tensor,
            mode,
            grid,
        })
    }

    /// Builds a context where every rank is a data-parallel replica.
    pub fn data_parallel(backend: Arc<dyn Backend>) -> CommResult<Self> {
        Self::new(backend, TensorParallelMode::None, 1)
    }

    /// Creates a single-rank context for testing.
    #[must_use]
    pub fn mock() -> Self {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::single());
        let pg = ProcessGroup::new(backend);
        Self {
            global: pg.clone(),
            data: pg.clone(),
            tensor: pg,
            mode: TensorParallelMode::None,
            grid: None,
        }
    }

    /// Group of every rank.
    #[must_use]
    pub fn global(&self) -> &ProcessGroup {
        &self.global
    }

    /// Data-parallel group of this rank.
    #[must_use]
    pub fn data(&self) -> &ProcessGroup {
        &self.data
    }

    /// Tensor-parallel group of this rank.
    #[must_use]
    pub fn tensor(&self) -> &ProcessGroup {
        &self.tensor
    }

    /// Tensor-parallel mode.
    #[must_use]
    pub fn mode(&self) -> TensorParallelMode {
        self.mode
    }

    /// Shard grid for the 2D/3D layouts.
    #[must_use]
    pub fn grid(&self) -> Option<&ShardGrid> {
        self.grid.as_ref()
    }

    /// Global rank.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.global.rank()
    }

    /// World size.
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.global.world_size()
    }

    /// Number of data-parallel replicas.
    #[must_use]
    pub fn data_parallel_size(&self) -> usize {
        self.data.size()
    }

    /// Number of ranks per tensor-parallel group.
    #[must_use]
    pub fn tensor_parallel_size(&self) -> usize {
        self.tensor.size()
    }

    /// Index of this rank's data-parallel replica.
    #[must_use]
    pub fn data_parallel_rank(&self) -> usize {
        self.data.group_rank().unwrap_or(0)
    }

    /// Whether this is global rank 0.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.rank() == 0
    }
}

/// Returns `q` with `q^k == n`, if one exists.
fn exact_root(n: usize, k: u32) -> Option<usize> {
    (1..=n).take_while(|q| q.pow(k) <= n).find(|q| q.pow(k) == n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parabench_tensor::DType;

    fn context(world: usize, rank: usize, mode: TensorParallelMode, tp: usize) -> CommResult<ParallelContext> {
        let backend = MockBackend::create_world(world).swap_remove(rank);
        ParallelContext::new(Arc::new(backend), mode, tp)
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("1d".parse::<TensorParallelMode>().unwrap(), TensorParallelMode::OneD);
        assert_eq!("3D".parse::<TensorParallelMode>().unwrap(), TensorParallelMode::ThreeD);
        assert_eq!("none".parse::<TensorParallelMode>().unwrap(), TensorParallelMode::None);
        assert!(matches!(
            "4d".parse::<TensorParallelMode>(),
            Err(CommError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_exact_root() {
        assert_eq!(exact_root(4, 2), Some(2));
        assert_eq!(exact_root(8, 3), Some(2));
        assert_eq!(exact_root(1, 3), Some(1));
        assert_eq!(exact_root(6, 2), None);
    }

    #[test]
    fn test_data_parallel_layout() {
        let ctx = context(4, 2, TensorParallelMode::None, 1).unwrap();
        assert_eq!(ctx.data().ranks(), &[0, 1, 2, 3]);
        assert_eq!(ctx.tensor().ranks(), &[2]);
        assert_eq!(ctx.data_parallel_size(), 4);
        assert_eq!(ctx.data_parallel_rank(), 2);
    }

    #[test]
    fn test_one_d_layout() {
        let ctx = context(8, 5, TensorParallelMode::OneD, 4).unwrap();
        assert_eq!(ctx.tensor().ranks(), &[4, 5, 6, 7]);
        assert_eq!(ctx.data().ranks(), &[1, 5]);
        assert!(ctx.grid().is_none());
    }

    #[test]
    fn test_two_d_grid() {
        // local rank 3 in a 2x2 grid: row 1, col 1
        let ctx = context(4, 3, TensorParallelMode::TwoD, 4).unwrap();
        let grid = ctx.grid().unwrap();
        assert_eq!(grid.class_group.ranks(), &[2, 3]);
        assert_eq!(grid.batch_group.ranks(), &[1, 3]);
        assert_eq!((grid.batch_shard, grid.class_shard), (1, 1));
    }

    #[test]
    fn test_three_d_grid() {
        // local rank 5 = (a=1, b=0, c=1)
        let ctx = context(8, 5, TensorParallelMode::ThreeD, 8).unwrap();
        let grid = ctx.grid().unwrap();
        assert_eq!(grid.class_group.ranks(), &[4, 5]);
        assert_eq!(grid.batch_group.ranks(), &[1, 3, 5, 7]);
        assert_eq!(grid.batch_shard, 2);
        assert_eq!(grid.class_shard, 1);
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(context(4, 0, TensorParallelMode::None, 2).is_err());
        assert!(context(6, 0, TensorParallelMode::OneD, 4).is_err());
        assert!(context(6, 0, TensorParallelMode::TwoD, 6).is_err());
        assert!(context(4, 0, TensorParallelMode::ThreeD, 4).is_err());
        assert!(context(4, 0, TensorParallelMode::OneD, 0).is_err());
    }

    #[test]
    fn test_local_shard() {
        let ctx = context(4, 2, TensorParallelMode::TwoD, 4).unwrap(); // row 1, col 0
        let grid = ctx.grid().unwrap();
        let logits = Tensor::from_vec((0..16).map(f64::from).collect(), &[4, 4], DType::F32).unwrap();
        let targets = Tensor::from_slice(&[0.0, 1.0, 2.0, 3.0], DType::I64);
        let (l, t) = grid.local_shard(&logits, &targets).unwrap();
        assert_eq!(l.shape(), &[2, 2]);
        assert_eq!(l.to_vec(), vec![8.0, 9.0, 12.0, 13.0]);
        assert_eq!(t.to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_mock_context() {
        let ctx = ParallelContext::mock();
        assert!(ctx.is_main());
        assert_eq!(ctx.world_size(), 1);
        assert_eq!(ctx.data_parallel_size(), 1);
        assert_eq!(ctx.tensor_parallel_size(), 1);
    }
}
