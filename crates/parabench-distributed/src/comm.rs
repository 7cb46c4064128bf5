//! Communication - High-level Communication Utilities
//!
//! Convenience wrappers over [`ProcessGroup`] collectives, plus the
//! data-parallel reducers used to aggregate statistics across replicas.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_tensor::Tensor;

use crate::backend::ReduceOp;
use crate::error::CommResult;
use crate::process_group::ProcessGroup;

// =============================================================================
// All-Reduce Operations
// =============================================================================

/// Performs all-reduce sum on a tensor.
pub fn all_reduce_sum(tensor: &mut Tensor, pg: &ProcessGroup) -> CommResult<()> {
    pg.all_reduce_tensor(tensor, ReduceOp::Sum)
}

/// Performs all-reduce min on a tensor.
pub fn all_reduce_min(tensor: &mut Tensor, pg: &ProcessGroup) -> CommResult<()> {
    pg.all_reduce_tensor(tensor, ReduceOp::Min)
}

/// Performs all-reduce max on a tensor.
pub fn all_reduce_max(tensor: &mut Tensor, pg: &ProcessGroup) -> CommResult<()> {
    pg.all_reduce_tensor(tensor, ReduceOp::Max)
}

// =============================================================================
// Broadcast Operations
// =============================================================================

/// Broadcasts a tensor from the group's first rank.
pub fn broadcast(tensor: &mut Tensor, pg: &ProcessGroup) -> CommResult<()> {
    let src = pg.ranks().first().copied().unwrap_or(0);
    broadcast_from(tensor, src, pg)
}

/// Broadcasts a tensor from a specific global rank.
pub fn broadcast_from(tensor: &mut Tensor, src: usize, pg: &ProcessGroup) -> CommResult<()> {
    pg.broadcast_tensor(tensor, src)
}

// =============================================================================
// Gather / Scatter Operations
// =============================================================================

/// All-gathers a tensor across all ranks of the group.
pub fn all_gather(tensor: &Tensor, pg: &ProcessGroup) -> CommResult<Vec<Tensor>> {
    pg.all_gather_tensor(tensor)
}

/// Reduce-scatters per-rank chunks with sum.
pub fn reduce_scatter_sum(chunks: &[Tensor], pg: &ProcessGroup) -> CommResult<Tensor> {
    pg.reduce_scatter_tensor(chunks, ReduceOp::Sum)
}

// =============================================================================
// Data-Parallel Reduction
// =============================================================================

/// Sums `value` across the group.
///
/// A single-member group returns the input unchanged without issuing a
/// collective.
pub fn reduce_sum(mut value: Tensor, pg: &ProcessGroup) -> CommResult<Tensor> {
    if pg.size() > 1 {
        pg.all_reduce_tensor(&mut value, ReduceOp::Sum)?;
    }
    Ok(value)
}

/// Averages `value` across the group.
///
/// The sum is computed by the collective first and divided by the group size
/// afterwards. A single-member group returns the input unchanged.
pub fn reduce_mean(value: Tensor, pg: &ProcessGroup) -> CommResult<Tensor> {
    let size = pg.size();
    if size > 1 {
        let summed = reduce_sum(value, pg)?;
        Ok(summed.div_scalar(size as f64))
    } else {
        Ok(value)
    }
}

/// Sums a host scalar across the group (carried as an `f64` tensor).
pub fn reduce_sum_scalar(value: f64, pg: &ProcessGroup) -> CommResult<f64> {
    let reduced = reduce_sum(Tensor::scalar(value, parabench_tensor::DType::F64), pg)?;
    Ok(reduced.item()?)
}

/// Averages a host scalar across the group (carried as an `f64` tensor).
pub fn reduce_mean_scalar(value: f64, pg: &ProcessGroup) -> CommResult<f64> {
    let reduced = reduce_mean(Tensor::scalar(value, parabench_tensor::DType::F64), pg)?;
    Ok(reduced.item()?)
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Synchronizes all processes of the group.
pub fn barrier(pg: &ProcessGroup) -> CommResult<()> {
    pg.barrier()
}

/// Checks if this is the main process (global rank 0).
#[must_use]
pub fn is_main_process(pg: &ProcessGroup) -> bool {
    pg.rank() == 0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use parabench_tensor::DType;
    use std::sync::Arc;
    use std::thread;

    fn run_group<T, F>(world: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(ProcessGroup) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let handles: Vec<_> = MockBackend::create_world(world)
            .into_iter()
            .map(|b| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(ProcessGroup::new(Arc::new(b))))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_reduce_sum_identity_single() {
        let pg = ProcessGroup::mock();
        let t = Tensor::from_slice(&[1.5, -2.0], DType::F32);
        assert_eq!(reduce_sum(t.clone(), &pg).unwrap(), t);
    }

    #[test]
    fn test_reduce_mean_identity_single() {
        let pg = ProcessGroup::mock();
        for v in [0.0, 1.0, -7.25, 1e9] {
            assert_eq!(reduce_mean_scalar(v, &pg).unwrap(), v);
            assert_eq!(reduce_sum_scalar(v, &pg).unwrap(), v);
        }
    }

    #[test]
    fn test_reduce_mean_is_sum_over_size() {
        let results = run_group(4, |pg| {
            let sum = reduce_sum_scalar(3.0, &pg).unwrap();
            let mean = reduce_mean_scalar(3.0, &pg).unwrap();
            (sum, mean)
        });
        for (sum, mean) in results {
            assert_eq!(sum, 12.0);
            assert_eq!(mean, sum / 4.0);
        }
    }

    #[test]
    fn test_reduce_mean_divides_after_collective() {
        // integer tensors: dividing first would truncate 1/2 to 0 on each rank
        let results = run_group(2, |pg| {
            let t = Tensor::scalar(1.0, DType::F64);
            let int_sum = reduce_sum(Tensor::scalar(1.0, DType::I64), &pg).unwrap();
            (reduce_mean(t, &pg).unwrap().item().unwrap(), int_sum.item().unwrap())
        });
        for (mean, sum) in results {
            assert_eq!(mean, 1.0);
            assert_eq!(sum, 2.0);
        }
    }

    #[test]
    fn test_all_reduce_helpers() {
        let results = run_group(2, |pg| {
            let r = pg.rank() as f64;
            let mut lo = Tensor::scalar(r, DType::F32);
            let mut hi = Tensor::scalar(r, DType::F32);
            all_reduce_min(&mut lo, &pg).unwrap();
            all_reduce_max(&mut hi, &pg).unwrap();
            (lo.item().unwrap(), hi.item().unwrap())
        });
        for (lo, hi) in results {
            assert_eq!((lo, hi), (0.0, 1.0));
        }
    }

    #[test]
    fn test_broadcast_from_first_rank() {
        let results = run_group(3, |pg| {
            let mut t = Tensor::scalar(pg.rank() as f64 + 1.0, DType::F32);
            broadcast(&mut t, &pg).unwrap();
            t.item().unwrap()
        });
        assert_eq!(results, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_all_gather_and_reduce_scatter() {
        let results = run_group(2, |pg| {
            let gathered = all_gather(&Tensor::scalar(pg.rank() as f64, DType::F32), &pg).unwrap();
            let chunks = vec![Tensor::scalar(1.0, DType::F32), Tensor::scalar(10.0, DType::F32)];
            let mine = reduce_scatter_sum(&chunks, &pg).unwrap();
            (
                gathered.iter().map(|t| t.item().unwrap()).collect::<Vec<_>>(),
                mine.item().unwrap(),
            )
        });
        assert_eq!(results[0], (vec![0.0, 1.0], 2.0));
        assert_eq!(results[1], (vec![0.0, 1.0], 20.0));
    }

    #[test]
    fn test_utilities() {
        let pg = ProcessGroup::mock();
        assert!(is_main_process(&pg));
        barrier(&pg).unwrap();
    }
}
