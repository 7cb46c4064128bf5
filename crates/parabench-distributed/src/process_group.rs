//! `ProcessGroup` - Process Group Abstraction
//!
//! A process group is a named subset of ranks that jointly execute
//! collectives. Every tensor-level collective here forwards to the backend
//! with the group's rank list.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::sync::Arc;

use parabench_tensor::Tensor;

use crate::backend::{Backend, MockBackend, ReduceOp, Work, WorkResult};
use crate::error::{CommError, CommResult};

// =============================================================================
// ProcessGroup
// =============================================================================

/// A group of processes that can communicate with each other.
pub struct ProcessGroup {
    backend: Arc<dyn Backend>,
    ranks: Vec<usize>,
}

impl ProcessGroup {
    /// Creates a process group spanning the whole world.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let world_size = backend.world_size();
        Self {
            backend,
            ranks: (0..world_size).collect(),
        }
    }

    /// Creates a process group with specific ranks (sorted and de-duplicated).
    pub fn with_ranks(backend: Arc<dyn Backend>, mut ranks: Vec<usize>) -> Self {
        ranks.sort_unstable();
        ranks.dedup();
        Self { backend, ranks }
    }

    /// Creates a single-rank process group for testing.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Arc::new(MockBackend::single()))
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Returns a shared handle to the backend.
    #[must_use]
    pub fn backend_arc(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// Returns the global rank of this process.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.backend.rank()
    }

    /// Returns the world size.
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.backend.world_size()
    }

    /// Returns the number of processes in this group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ranks.len()
    }

    /// Returns the ranks in this group.
    #[must_use]
    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    /// Returns this process's index within the group, if it is a member.
    #[must_use]
    pub fn group_rank(&self) -> Option<usize> {
        self.ranks.iter().position(|&r| r == self.rank())
    }

    /// Checks if a global rank is part of the group.
    #[must_use]
    pub fn contains(&self, rank: usize) -> bool {
        self.ranks.contains(&rank)
    }

    /// Synchronizes all processes in the group.
    pub fn barrier(&self) -> CommResult<()> {
        self.backend.barrier(&self.ranks)
    }

    // =========================================================================
    // Raw collectives
    // =========================================================================

    /// Issues an all-reduce on this group.
    pub fn all_reduce(&self, tensor: &mut Tensor, op: ReduceOp, async_op: bool) -> WorkResult {
        self.backend.all_reduce(tensor, op, &self.ranks, async_op)
    }

    /// Issues an all-gather on this group.
    pub fn all_gather(&self, outputs: &mut [Tensor], input: &Tensor, async_op: bool) -> WorkResult {
        self.backend.all_gather(outputs, input, &self.ranks, async_op)
    }

    /// Issues a reduce-scatter on this group.
    pub fn reduce_scatter(
        &self,
        output: &mut Tensor,
        inputs: &[Tensor],
        op: ReduceOp,
        async_op: bool,
    ) -> WorkResult {
        self.backend
            .reduce_scatter(output, inputs, op, &self.ranks, async_op)
    }

    /// Issues a broadcast from global rank `src` on this group.
    pub fn broadcast(&self, tensor: &mut Tensor, src: usize, async_op: bool) -> WorkResult {
        self.backend.broadcast(tensor, src, &self.ranks, async_op)
    }

    /// Issues a reduce to global rank `dst` on this group.
    pub fn reduce(&self, tensor: &mut Tensor, dst: usize, op: ReduceOp, async_op: bool) -> WorkResult {
        self.backend.reduce(tensor, dst, op, &self.ranks, async_op)
    }

    // =========================================================================
    // Tensor-level helpers
    // =========================================================================

    /// Performs a blocking all-reduce on a tensor.
    pub fn all_reduce_tensor(&self, tensor: &mut Tensor, op: ReduceOp) -> CommResult<()> {
        self.all_reduce(tensor, op, false).map(drop)
    }

    /// Starts an all-reduce and returns its completion handle.
    pub fn all_reduce_async(&self, tensor: &mut Tensor, op: ReduceOp) -> CommResult<Box<dyn Work>> {
        expect_handle(self.all_reduce(tensor, op, true)?)
    }

    /// Broadcasts a tensor from global rank `src`.
    pub fn broadcast_tensor(&self, tensor: &mut Tensor, src: usize) -> CommResult<()> {
        self.broadcast(tensor, src, false).map(drop)
    }

    /// Reduces a tensor onto global rank `dst`.
    pub fn reduce_tensor(&self, tensor: &mut Tensor, dst: usize, op: ReduceOp) -> CommResult<()> {
        self.reduce(tensor, dst, op, false).map(drop)
    }

    /// Gathers a tensor from every member, in group order.
    pub fn all_gather_tensor(&self, tensor: &Tensor) -> CommResult<Vec<Tensor>> {
        let mut outputs = vec![Tensor::zeros(tensor.shape(), tensor.dtype()); self.size()];
        self.all_gather(&mut outputs, tensor, false)?;
        Ok(outputs)
    }

    /// Reduces one chunk per member and returns this member's reduced chunk.
    pub fn reduce_scatter_tensor(&self, inputs: &[Tensor], op: ReduceOp) -> CommResult<Tensor> {
        let first = inputs.first().ok_or(CommError::BufferCount {
            expected: self.size(),
            actual: 0,
        })?;
        let mut output = Tensor::zeros(first.shape(), first.dtype());
        self.reduce_scatter(&mut output, inputs, op, false)?;
        Ok(output)
    }
}

fn expect_handle(handle: Option<Box<dyn Work>>) -> CommResult<Box<dyn Work>> {
    handle.ok_or_else(|| {
        CommError::Backend("asynchronous collective returned no work handle".to_string())
    })
}

impl Clone for ProcessGroup {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ranks: self.ranks.clone(),
        }
    }
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("backend", &self.backend.name())
            .field("ranks", &self.ranks)
            .finish()
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

    #[test]
    fn test_process_group_mock() {
        let pg = ProcessGroup::mock();
        assert_eq!(pg.rank(), 0);
        assert_eq!(pg.world_size(), 1);
        assert_eq!(pg.size(), 1);
        assert_eq!(pg.group_rank(), Some(0));
    }

    #[test]
    fn test_process_group_contains() {
        let pg = ProcessGroup::mock();
        assert!(pg.contains(0));
        assert!(!pg.contains(1));
    }

    #[test]
    fn test_with_ranks_sorts() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::single());
        let pg = ProcessGroup::with_ranks(backend, vec![3, 1, 3, 0]);
        assert_eq!(pg.ranks(), &[0, 1, 3]);
        assert_eq!(pg.group_rank(), Some(0));
    }

    #[test]
    fn test_all_reduce_tensor_two_ranks() {
        let handles: Vec<_> = MockBackend::create_world(2)
            .into_iter()
            .map(|b| {
                thread::spawn(move || {
                    let pg = ProcessGroup::new(Arc::new(b));
                    let mut t = Tensor::from_slice(&[1.0, 2.0, 3.0], DType::F32);
                    pg.all_reduce_tensor(&mut t, ReduceOp::Sum).unwrap();
                    t.to_vec()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![2.0, 4.0, 6.0]);
        }
    }

    #[test]
    fn test_all_reduce_async_single() {
        let pg = ProcessGroup::mock();
        let mut t = Tensor::from_slice(&[1.0, 2.0], DType::F32);
        let work = pg.all_reduce_async(&mut t, ReduceOp::Sum).unwrap();
        work.wait().unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_all_gather_tensor() {
        let pg = ProcessGroup::mock();
        let t = Tensor::from_slice(&[1.0, 2.0], DType::F32);
        let gathered = pg.all_gather_tensor(&t).unwrap();
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0].to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_reduce_scatter_tensor() {
        let pg = ProcessGroup::mock();
        let chunks = vec![Tensor::from_slice(&[4.0, 5.0], DType::F32)];
        let out = pg.reduce_scatter_tensor(&chunks, ReduceOp::Sum).unwrap();
        assert_eq!(out.to_vec(), vec![4.0, 5.0]);
        assert!(pg.reduce_scatter_tensor(&[], ReduceOp::Sum).is_err());
    }

    #[test]
    fn test_broadcast_and_reduce_single() {
        let pg = ProcessGroup::mock();
        let mut t = Tensor::from_slice(&[1.0, 2.0], DType::F32);
        pg.broadcast_tensor(&mut t, 0).unwrap();
        pg.reduce_tensor(&mut t, 0, ReduceOp::Sum).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_process_group_barrier() {
        let pg = ProcessGroup::mock();
        pg.barrier().unwrap();
    }

    #[test]
    fn test_process_group_clone() {
        let pg = ProcessGroup::mock();
        let pg2 = pg.clone();
        assert_eq!(pg.rank(), pg2.rank());
        assert_eq!(pg.ranks(), pg2.ranks());
    }
}
