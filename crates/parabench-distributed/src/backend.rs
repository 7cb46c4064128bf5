//! Backend - Communication Backend Abstractions
//!
//! Provides the backend trait through which every collective is issued, the
//! completion token returned by asynchronous collectives, and an in-process
//! mock backend that simulates a multi-rank world.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::collections::HashMap;
use std::sync::Arc;

use parabench_tensor::Tensor;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{CommError, CommResult};

// =============================================================================
// Reduce Operations
// =============================================================================

/// Reduction operation for collective communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReduceOp {
    /// Sum all values.
    #[default]
    Sum,
    /// Compute product of all values.
    Product,
    /// Find minimum value.
    Min,
    /// Find maximum value.
    Max,
    /// Compute average of all values.
    Average,
}

impl ReduceOp {
    /// Applies the reduction operation to two values.
    ///
    /// `Average` combines like `Sum`; the division happens in [`reduce_slices`].
    ///
    /// [`reduce_slices`]: ReduceOp::reduce_slices
    #[must_use]
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum | ReduceOp::Average => a + b,
            ReduceOp::Product => a * b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }

    /// Reduces equally sized slices elementwise, in slice order.
    pub fn reduce_slices(&self, slices: &[&[f64]]) -> CommResult<Vec<f64>> {
        let Some(first) = slices.first() else {
            return Ok(Vec::new());
        };

        let mut result = first.to_vec();
        for slice in &slices[1..] {
            if slice.len() != result.len() {
                return Err(CommError::Tensor(parabench_tensor::TensorError::shape_mismatch(
                    &[result.len()],
                    &[slice.len()],
                )));
            }
            for (acc, &val) in result.iter_mut().zip(slice.iter()) {
                *acc = self.apply(*acc, val);
            }
        }

        if *self == ReduceOp::Average {
            let count = slices.len() as f64;
            for val in &mut result {
                *val /= count;
            }
        }

        Ok(result)
    }
}

// =============================================================================
// Work Handles
// =============================================================================

/// Completion token of an asynchronous collective.
///
/// `wait` consumes the handle, so a collective can be awaited at most once.
pub trait Work: Send {
    /// Blocks until the collective has completed.
    fn wait(self: Box<Self>) -> CommResult<()>;
}

/// A work handle for an operation that already finished.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletedWork;

impl Work for CompletedWork {
    fn wait(self: Box<Self>) -> CommResult<()> {
        Ok(())
    }
}

/// Result of issuing a collective: a handle exactly when issued asynchronously.
pub type WorkResult = CommResult<Option<Box<dyn Work>>>;

// =============================================================================
// Backend Trait
// =============================================================================

/// Trait for distributed communication backends.
///
/// `group` is the ascending list of global ranks taking part in the
/// collective. Every member must issue the same sequence of collectives on
/// the same groups; backends do not detect divergence.
pub trait Backend: Send + Sync {
    /// Returns the name of the backend.
    fn name(&self) -> &str;

    /// Returns the global rank of this process.
    fn rank(&self) -> usize;

    /// Returns the total world size.
    fn world_size(&self) -> usize;

    /// Reduces `tensor` across the group; every member receives the result.
    fn all_reduce(&self, tensor: &mut Tensor, op: ReduceOp, group: &[usize], async_op: bool)
        -> WorkResult;

    /// Gathers `input` from every member into `outputs` (one per member, in group order).
    fn all_gather(
        &self,
        outputs: &mut [Tensor],
        input: &Tensor,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult;

    /// Reduces `inputs[i]` across members and leaves the result on member `i`.
    fn reduce_scatter(
        &self,
        output: &mut Tensor,
        inputs: &[Tensor],
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult;

    /// Copies `tensor` from global rank `src` to every member.
    fn broadcast(&self, tensor: &mut Tensor, src: usize, group: &[usize], async_op: bool)
        -> WorkResult;

    /// Reduces `tensor` across members; only global rank `dst` receives the result.
    fn reduce(
        &self,
        tensor: &mut Tensor,
        dst: usize,
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult;

    /// Synchronizes all members of the group.
    fn barrier(&self, group: &[usize]) -> CommResult<()>;
}

// =============================================================================
// Rendezvous for Mock Backend
// =============================================================================

type Payload = Vec<Vec<f64>>;

/// One collective round for one group.
#[derive(Debug)]
struct Slot {
    arrived: Vec<Option<Payload>>,
    count: usize,
    gathered: Option<Arc<Vec<Payload>>>,
    departed: usize,
}

impl Slot {
    fn new(size: usize) -> Self {
        Self {
            arrived: vec![None; size],
            count: 0,
            gathered: None,
            departed: 0,
        }
    }
}

/// Shared exchange table; every collective is an all-to-all exchange of payloads.
#[derive(Debug, Default)]
struct Rendezvous {
    slots: Mutex<HashMap<Vec<usize>, Slot>>,
    cond: Condvar,
}

impl Rendezvous {
    /// Deposits `payload` for member `index` and blocks until every member has
    /// deposited; returns all payloads in group order.
    fn exchange(&self, group: &[usize], index: usize, payload: Payload) -> CommResult<Arc<Vec<Payload>>> {
        let size = group.len();
        let mut slots = self.slots.lock();

        // previous round still draining
        while slots.get(group).is_some_and(|s| s.gathered.is_some()) {
            self.cond.wait(&mut slots);
        }

        let slot = slots
            .entry(group.to_vec())
            .or_insert_with(|| Slot::new(size));
        if slot.arrived[index].is_some() {
            return Err(CommError::Backend(format!(
                "member {index} of group {group:?} issued overlapping collectives"
            )));
        }
        slot.arrived[index] = Some(payload);
        slot.count += 1;

        if slot.count == size {
            let all = slot
                .arrived
                .iter_mut()
                .map(|p| p.take().unwrap_or_default())
                .collect();
            slot.gathered = Some(Arc::new(all));
            slot.count = 0;
            self.cond.notify_all();
        } else {
            while slots.get(group).is_some_and(|s| s.gathered.is_none()) {
                self.cond.wait(&mut slots);
            }
        }

        let slot = slots
            .get_mut(group)
            .ok_or_else(|| CommError::Backend("rendezvous slot missing".to_string()))?;
        let result = slot
            .gathered
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| CommError::Backend("rendezvous round missing".to_string()))?;

        slot.departed += 1;
        if slot.departed == size {
            slot.gathered = None;
            slot.departed = 0;
            self.cond.notify_all();
        }

        Ok(result)
    }
}

// =============================================================================
// Mock Backend
// =============================================================================

/// A mock backend simulating a multi-rank world inside one process.
///
/// Each rank handle is meant to be driven from its own thread. Collectives
/// block until every member of the group has issued the matching call, as a
/// real collective would. Asynchronous calls complete eagerly and hand back a
/// [`CompletedWork`].
#[derive(Clone)]
pub struct MockBackend {
    rank: usize,
    world_size: usize,
    state: Arc<Rendezvous>,
}

impl MockBackend {
    /// Creates one backend handle per rank of a world of `world_size`.
    #[must_use]
    pub fn create_world(world_size: usize) -> Vec<Self> {
        let state = Arc::new(Rendezvous::default());
        (0..world_size)
            .map(|rank| MockBackend {
                rank,
                world_size,
                state: Arc::clone(&state),
            })
            .collect()
    }

    /// Creates a single mock backend (rank 0, world size 1).
    #[must_use]
    pub fn single() -> Self {
        MockBackend {
            rank: 0,
            world_size: 1,
            state: Arc::new(Rendezvous::default()),
        }
    }

    fn member_index(&self, rank: usize, group: &[usize]) -> CommResult<usize> {
        if group.is_empty() {
            return Err(CommError::InvalidGroup("empty group".to_string()));
        }
        group
            .iter()
            .position(|&r| r == rank)
            .ok_or_else(|| CommError::RankNotInGroup {
                rank,
                group: group.to_vec(),
            })
    }

    fn exchange(&self, group: &[usize], payload: Payload) -> CommResult<(usize, Arc<Vec<Payload>>)> {
        let index = self.member_index(self.rank, group)?;
        let all = self.state.exchange(group, index, payload)?;
        Ok((index, all))
    }

    fn handle(async_op: bool) -> Option<Box<dyn Work>> {
        if async_op {
            Some(Box::new(CompletedWork))
        } else {
            None
        }
    }
}

fn first_buffer(payload: &Payload) -> CommResult<&[f64]> {
    payload
        .first()
        .map(Vec::as_slice)
        .ok_or_else(|| CommError::Backend("member contributed no buffer".to_string()))
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce(&self, tensor: &mut Tensor, op: ReduceOp, group: &[usize], async_op: bool)
        -> WorkResult {
        trace!(rank = self.rank, ?group, numel = tensor.numel(), "mock all_reduce");
        let (_, all) = self.exchange(group, vec![tensor.to_vec()])?;
        let slices = all.iter().map(first_buffer).collect::<CommResult<Vec<_>>>()?;
        let reduced = op.reduce_slices(&slices)?;
        tensor.copy_from_slice(&reduced)?;
        Ok(Self::handle(async_op))
    }

    fn all_gather(
        &self,
        outputs: &mut [Tensor],
        input: &Tensor,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        trace!(rank = self.rank, ?group, numel = input.numel(), "mock all_gather");
        if outputs.len() != group.len() {
            return Err(CommError::BufferCount {
                expected: group.len(),
                actual: outputs.len(),
            });
        }
        let (_, all) = self.exchange(group, vec![input.to_vec()])?;
        for (out, payload) in outputs.iter_mut().zip(all.iter()) {
            out.copy_from_slice(first_buffer(payload)?)?;
        }
        Ok(Self::handle(async_op))
    }

    fn reduce_scatter(
        &self,
        output: &mut Tensor,
        inputs: &[Tensor],
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        trace!(rank = self.rank, ?group, chunks = inputs.len(), "mock reduce_scatter");
        if inputs.len() != group.len() {
            return Err(CommError::BufferCount {
                expected: group.len(),
                actual: inputs.len(),
            });
        }
        let (index, all) = self.exchange(group, inputs.iter().map(Tensor::to_vec).collect())?;
        let slices = all
            .iter()
            .map(|payload| {
                payload
                    .get(index)
                    .map(Vec::as_slice)
                    .ok_or_else(|| CommError::Backend("missing reduce-scatter chunk".to_string()))
            })
            .collect::<CommResult<Vec<_>>>()?;
        let reduced = op.reduce_slices(&slices)?;
        output.copy_from_slice(&reduced)?;
        Ok(Self::handle(async_op))
    }

    fn broadcast(&self, tensor: &mut Tensor, src: usize, group: &[usize], async_op: bool)
        -> WorkResult {
        trace!(rank = self.rank, ?group, src, "mock broadcast");
        let src_index = self.member_index(src, group)?;
        let payload = if self.rank == src {
            vec![tensor.to_vec()]
        } else {
            Vec::new()
        };
        let (_, all) = self.exchange(group, payload)?;
        tensor.copy_from_slice(first_buffer(&all[src_index])?)?;
        Ok(Self::handle(async_op))
    }

    fn reduce(
        &self,
        tensor: &mut Tensor,
        dst: usize,
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        trace!(rank = self.rank, ?group, dst, "mock reduce");
        self.member_index(dst, group)?;
        let (_, all) = self.exchange(group, vec![tensor.to_vec()])?;
        if self.rank == dst {
            let slices = all.iter().map(first_buffer).collect::<CommResult<Vec<_>>>()?;
            let reduced = op.reduce_slices(&slices)?;
            tensor.copy_from_slice(&reduced)?;
        }
        Ok(Self::handle(async_op))
    }

    fn barrier(&self, group: &[usize]) -> CommResult<()> {
        self.exchange(group, Vec::new())?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parabench_tensor::DType;
    use std::thread;

    /// Runs `f` on every rank of a mock world, one thread per rank.
    fn run_world<T, F>(world_size: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(MockBackend) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let handles: Vec<_> = MockBackend::create_world(world_size)
            .into_iter()
            .map(|backend| {
                let f = Arc::clone(&f);
                thread::spawn(move || f(backend))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_reduce_op_apply() {
        assert_eq!(ReduceOp::Sum.apply(1.0, 2.0), 3.0);
        assert_eq!(ReduceOp::Product.apply(2.0, 3.0), 6.0);
        assert_eq!(ReduceOp::Min.apply(2.0, 3.0), 2.0);
        assert_eq!(ReduceOp::Max.apply(2.0, 3.0), 3.0);
    }

    #[test]
    fn test_reduce_slices_sum() {
        let slices: Vec<&[f64]> = vec![&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]];
        assert_eq!(ReduceOp::Sum.reduce_slices(&slices).unwrap(), vec![9.0, 12.0]);
    }

    #[test]
    fn test_reduce_slices_average() {
        let slices: Vec<&[f64]> = vec![&[1.0, 2.0], &[3.0, 4.0], &[5.0, 9.0]];
        assert_eq!(ReduceOp::Average.reduce_slices(&slices).unwrap(), vec![3.0, 5.0]);
    }

    #[test]
    fn test_reduce_slices_length_mismatch() {
        let slices: Vec<&[f64]> = vec![&[1.0, 2.0], &[3.0]];
        assert!(ReduceOp::Sum.reduce_slices(&slices).is_err());
    }

    #[test]
    fn test_mock_backend_single() {
        let backend = MockBackend::single();
        assert_eq!(backend.rank(), 0);
        assert_eq!(backend.world_size(), 1);
        assert_eq!(backend.name(), "mock");

        let mut t = Tensor::from_slice(&[1.0, 2.0], DType::F32);
        assert!(backend.all_reduce(&mut t, ReduceOp::Sum, &[0], false).unwrap().is_none());
        assert_eq!(t.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_mock_backend_world() {
        let backends = MockBackend::create_world(4);
        for (i, b) in backends.iter().enumerate() {
            assert_eq!(b.rank(), i);
            assert_eq!(b.world_size(), 4);
        }
    }

    #[test]
    fn test_mock_all_reduce_across_threads() {
        let results = run_world(4, |backend| {
            let mut t = Tensor::from_slice(&[backend.rank() as f64, 1.0], DType::F32);
            backend
                .all_reduce(&mut t, ReduceOp::Sum, &[0, 1, 2, 3], false)
                .unwrap();
            t.to_vec()
        });
        for r in results {
            assert_eq!(r, vec![6.0, 4.0]);
        }
    }

    #[test]
    fn test_mock_repeated_rounds_stay_ordered() {
        let results = run_world(3, |backend| {
            let mut out = Vec::new();
            for round in 0..20 {
                let mut t = Tensor::scalar(f64::from(round), DType::F64);
                backend.all_reduce(&mut t, ReduceOp::Max, &[0, 1, 2], false).unwrap();
                out.push(t.item().unwrap());
            }
            out
        });
        let expected: Vec<f64> = (0..20).map(f64::from).collect();
        for r in results {
            assert_eq!(r, expected);
        }
    }

    #[test]
    fn test_mock_async_returns_handle() {
        let results = run_world(2, |backend| {
            let mut t = Tensor::scalar(1.0, DType::F32);
            let work = backend
                .all_reduce(&mut t, ReduceOp::Sum, &[0, 1], true)
                .unwrap()
                .expect("async collective returns a handle");
            work.wait().unwrap();
            t.item().unwrap()
        });
        assert_eq!(results, vec![2.0, 2.0]);
    }

    #[test]
    fn test_mock_broadcast() {
        let results = run_world(2, |backend| {
            let mut t = if backend.rank() == 1 {
                Tensor::from_slice(&[1.0, 2.0, 3.0], DType::F32)
            } else {
                Tensor::zeros(&[3], DType::F32)
            };
            backend.broadcast(&mut t, 1, &[0, 1], false).unwrap();
            t.to_vec()
        });
        for r in results {
            assert_eq!(r, vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_mock_all_gather() {
        let results = run_world(3, |backend| {
            let input = Tensor::scalar(backend.rank() as f64 * 10.0, DType::F32);
            let mut outputs = vec![Tensor::scalar(0.0, DType::F32); 3];
            backend.all_gather(&mut outputs, &input, &[0, 1, 2], false).unwrap();
            outputs.iter().map(|t| t.item().unwrap()).collect::<Vec<_>>()
        });
        for r in results {
            assert_eq!(r, vec![0.0, 10.0, 20.0]);
        }
    }

    #[test]
    fn test_mock_reduce_scatter() {
        let results = run_world(2, |backend| {
            let inputs = vec![
                Tensor::from_slice(&[1.0, 1.0], DType::F32),
                Tensor::from_slice(&[2.0, 2.0], DType::F32),
            ];
            let mut output = Tensor::zeros(&[2], DType::F32);
            backend
                .reduce_scatter(&mut output, &inputs, ReduceOp::Sum, &[0, 1], false)
                .unwrap();
            output.to_vec()
        });
        assert_eq!(results[0], vec![2.0, 2.0]);
        assert_eq!(results[1], vec![4.0, 4.0]);
    }

    #[test]
    fn test_mock_reduce_only_dst_receives() {
        let results = run_world(2, |backend| {
            let mut t = Tensor::scalar(5.0, DType::F32);
            backend.reduce(&mut t, 0, ReduceOp::Sum, &[0, 1], false).unwrap();
            t.item().unwrap()
        });
        assert_eq!(results, vec![10.0, 5.0]);
    }

    #[test]
    fn test_mock_subgroups_are_independent() {
        let results = run_world(4, |backend| {
            let group: Vec<usize> = if backend.rank() % 2 == 0 { vec![0, 2] } else { vec![1, 3] };
            let mut t = Tensor::scalar(backend.rank() as f64, DType::F32);
            backend.all_reduce(&mut t, ReduceOp::Sum, &group, false).unwrap();
            t.item().unwrap()
        });
        assert_eq!(results, vec![2.0, 4.0, 2.0, 4.0]);
    }

    #[test]
    fn test_mock_rejects_non_member() {
        let backend = MockBackend::create_world(2).remove(0);
        let mut t = Tensor::scalar(1.0, DType::F32);
        let Err(err) = backend.all_reduce(&mut t, ReduceOp::Sum, &[1], false) else {
            panic!("all_reduce outside the group succeeded");
        };
        assert!(matches!(err, CommError::RankNotInGroup { rank: 0, .. }));
    }

    #[test]
    fn test_mock_all_gather_buffer_count() {
        let backend = MockBackend::single();
        let input = Tensor::scalar(1.0, DType::F32);
        let mut outputs = vec![Tensor::scalar(0.0, DType::F32); 2];
        let Err(err) = backend.all_gather(&mut outputs, &input, &[0], false) else {
            panic!("all_gather with too many buffers succeeded");
        };
        assert_eq!(
            err,
            CommError::BufferCount {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_mock_barrier() {
        run_world(3, |backend| backend.barrier(&[0, 1, 2]).unwrap());
    }
}
