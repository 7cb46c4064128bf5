//! Profiling Backend - Recording Decorator over a Real Backend
//!
//! Wraps the process's backend once at start-up. Every collective issued
//! while the profiler is started is charged its modelled volume and opens
//! (or extends) the busy span; the span is closed when the call returns or,
//! for asynchronous calls, when the returned [`CommHandle`] is awaited.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::sync::Arc;

use parabench_distributed::{Backend, CommResult, ReduceOp, Work, WorkResult};
use parabench_tensor::Tensor;

use crate::profiler::CommProfiler;
use crate::session::PendingCollective;
use crate::volume::{
    all_gather_volume, all_reduce_volume, broadcast_volume, reduce_scatter_volume, reduce_volume,
    CollectiveKind,
};

// =============================================================================
// CommHandle
// =============================================================================

/// Completion handle of a profiled asynchronous collective.
///
/// Waiting finishes the underlying collective and then closes its share of
/// the busy span. A handle that is never awaited keeps the profiler's
/// `running_ops` above zero for good.
pub struct CommHandle {
    profiler: CommProfiler,
    work: Box<dyn Work>,
}

impl CommHandle {
    fn new(profiler: CommProfiler, work: Box<dyn Work>) -> Self {
        Self { profiler, work }
    }
}

impl Work for CommHandle {
    fn wait(self: Box<Self>) -> CommResult<()> {
        let CommHandle { profiler, work } = *self;
        let result = work.wait();
        profiler.complete();
        result
    }
}

// =============================================================================
// ProfilingBackend
// =============================================================================

/// Backend decorator that feeds a [`CommProfiler`].
#[derive(Clone)]
pub struct ProfilingBackend {
    inner: Arc<dyn Backend>,
    profiler: CommProfiler,
}

impl ProfilingBackend {
    /// Wraps `inner`; collectives are recorded into `profiler` while it is started.
    pub fn new(inner: Arc<dyn Backend>, profiler: CommProfiler) -> Self {
        Self { inner, profiler }
    }

    /// The profiler fed by this backend.
    #[must_use]
    pub fn profiler(&self) -> &CommProfiler {
        &self.profiler
    }

    /// The wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    fn record<F>(&self, kind: CollectiveKind, byte_volume: f64, async_op: bool, call: F) -> WorkResult
    where
        F: FnOnce(&dyn Backend) -> WorkResult,
    {
        let pending = PendingCollective {
            kind,
            byte_volume,
            is_async: async_op,
        };
        let recorded = self.profiler.issue(&pending);
        let result = call(self.inner.as_ref());
        if !recorded {
            return result;
        }

        match result {
            Ok(Some(work)) => Ok(Some(Box::new(CommHandle::new(self.profiler.clone(), work)))),
            Ok(None) => {
                self.profiler.complete();
                Ok(None)
            }
            Err(e) => {
                self.profiler.complete();
                Err(e)
            }
        }
    }
}

impl Backend for ProfilingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn world_size(&self) -> usize {
        self.inner.world_size()
    }

    fn all_reduce(&self, tensor: &mut Tensor, op: ReduceOp, group: &[usize], async_op: bool)
        -> WorkResult {
        let volume = all_reduce_volume(group.len(), tensor.nbytes());
        self.record(CollectiveKind::AllReduce, volume, async_op, |b| {
            b.all_reduce(tensor, op, group, async_op)
        })
    }

    fn all_gather(
        &self,
        outputs: &mut [Tensor],
        input: &Tensor,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        let chunks: Vec<usize> = outputs.iter().map(Tensor::nbytes).collect();
        let volume = all_gather_volume(group.len(), &chunks);
        self.record(CollectiveKind::AllGather, volume, async_op, |b| {
            b.all_gather(outputs, input, group, async_op)
        })
    }

    fn reduce_scatter(
        &self,
        output: &mut Tensor,
        inputs: &[Tensor],
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        let chunks: Vec<usize> = inputs.iter().map(Tensor::nbytes).collect();
        let volume = reduce_scatter_volume(group.len(), &chunks);
        self.record(CollectiveKind::ReduceScatter, volume, async_op, |b| {
            b.reduce_scatter(output, inputs, op, group, async_op)
        })
    }

    fn broadcast(&self, tensor: &mut Tensor, src: usize, group: &[usize], async_op: bool)
        -> WorkResult {
        let volume = broadcast_volume(tensor.nbytes());
        self.record(CollectiveKind::Broadcast, volume, async_op, |b| {
            b.broadcast(tensor, src, group, async_op)
        })
    }

    fn reduce(
        &self,
        tensor: &mut Tensor,
        dst: usize,
        op: ReduceOp,
        group: &[usize],
        async_op: bool,
    ) -> WorkResult {
        let volume = reduce_volume(tensor.nbytes());
        self.record(CollectiveKind::Reduce, volume, async_op, |b| {
            b.reduce(tensor, dst, op, group, async_op)
        })
    }

    fn barrier(&self, group: &[usize]) -> CommResult<()> {
        self.inner.barrier(group)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parabench_distributed::{CommError, MockBackend};
    use parabench_tensor::DType;
    use std::thread;
    use std::time::Duration;

    /// Backend whose all-reduce takes a known amount of wall time.
    struct SleepyBackend {
        inner: MockBackend,
        delay: Duration,
    }

    impl Backend for SleepyBackend {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn rank(&self) -> usize {
            self.inner.rank()
        }
        fn world_size(&self) -> usize {
            self.inner.world_size()
        }
        fn all_reduce(&self, t: &mut Tensor, op: ReduceOp, g: &[usize], a: bool) -> WorkResult {
            thread::sleep(self.delay);
            self.inner.all_reduce(t, op, g, a)
        }
        fn all_gather(&self, o: &mut [Tensor], i: &Tensor, g: &[usize], a: bool) -> WorkResult {
            self.inner.all_gather(o, i, g, a)
        }
        fn reduce_scatter(
            &self,
            o: &mut Tensor,
            i: &[Tensor],
            op: ReduceOp,
            g: &[usize],
            a: bool,
        ) -> WorkResult {
            self.inner.reduce_scatter(o, i, op, g, a)
        }
        fn broadcast(&self, t: &mut Tensor, s: usize, g: &[usize], a: bool) -> WorkResult {
            self.inner.broadcast(t, s, g, a)
        }
        fn reduce(&self, t: &mut Tensor, d: usize, op: ReduceOp, g: &[usize], a: bool) -> WorkResult {
            self.inner.reduce(t, d, op, g, a)
        }
        fn barrier(&self, g: &[usize]) -> CommResult<()> {
            self.inner.barrier(g)
        }
    }

    fn sleepy(delay_ms: u64) -> (ProfilingBackend, CommProfiler) {
        let profiler = CommProfiler::new();
        let inner = SleepyBackend {
            inner: MockBackend::single(),
            delay: Duration::from_millis(delay_ms),
        };
        (ProfilingBackend::new(Arc::new(inner), profiler.clone()), profiler)
    }

    #[test]
    fn test_sync_collective_is_timed() {
        let (backend, profiler) = sleepy(20);
        let mut t = Tensor::zeros(&[16], DType::F32);
        profiler.start().unwrap();
        assert!(backend.all_reduce(&mut t, ReduceOp::Sum, &[0], false).unwrap().is_none());
        let stats = profiler.stop().unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.time >= 0.02);
        assert_eq!(profiler.running_ops(), 0);
    }

    #[test]
    fn test_stopped_profiler_forwards_untouched() {
        let (backend, profiler) = sleepy(0);
        let mut t = Tensor::from_slice(&[1.0, 2.0], DType::F32);
        backend.all_reduce(&mut t, ReduceOp::Sum, &[0], false).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 2.0]);
        assert_eq!(profiler.stats(), crate::CommStats::default());
    }

    #[test]
    fn test_async_wait_closes_window() {
        let (backend, profiler) = sleepy(5);
        let mut t = Tensor::zeros(&[4], DType::F32);
        profiler.start().unwrap();
        let handle = backend
            .all_reduce(&mut t, ReduceOp::Sum, &[0], true)
            .unwrap()
            .expect("async collective returns a handle");
        assert_eq!(profiler.running_ops(), 1);
        thread::sleep(Duration::from_millis(10));
        handle.wait().unwrap();
        assert_eq!(profiler.running_ops(), 0);
        let stats = profiler.stop().unwrap();
        assert_eq!(stats.count, 1);
        // busy span runs until the wait, not until the call returned
        assert!(stats.time >= 0.015);

        profiler.reset();
        profiler.start().unwrap();
        backend.all_reduce(&mut t, ReduceOp::Sum, &[0], false).unwrap();
        let sync = profiler.stop().unwrap();
        assert_eq!(sync.count, stats.count);
        assert_eq!(sync.volume, stats.volume);
    }

    #[test]
    fn test_async_volume_matches_sync_two_ranks() {
        let handles: Vec<_> = MockBackend::create_world(2)
            .into_iter()
            .map(|b| {
                thread::spawn(move || {
                    let profiler = CommProfiler::new();
                    let backend = ProfilingBackend::new(Arc::new(b), profiler.clone());
                    let mut t = Tensor::zeros(&[256], DType::F32);

                    profiler.start().unwrap();
                    backend
                        .all_reduce(&mut t, ReduceOp::Sum, &[0, 1], true)
                        .unwrap()
                        .expect("async collective returns a handle")
                        .wait()
                        .unwrap();
                    let async_stats = profiler.stop().unwrap();

                    profiler.reset();
                    profiler.start().unwrap();
                    backend.all_reduce(&mut t, ReduceOp::Sum, &[0, 1], false).unwrap();
                    (async_stats, profiler.stop().unwrap())
                })
            })
            .collect();
        for h in handles {
            let (async_stats, sync_stats) = h.join().unwrap();
            // 2 * (2-1)/2 * 1024 bytes
            assert_eq!(async_stats.volume, 1024.0);
            assert_eq!(async_stats.volume, sync_stats.volume);
            assert_eq!(async_stats.count, sync_stats.count);
        }
    }

    #[test]
    fn test_unawaited_handle_leaks_running_op() {
        let (backend, profiler) = sleepy(0);
        let mut t = Tensor::zeros(&[4], DType::F32);
        profiler.start().unwrap();
        let handle = backend.all_reduce(&mut t, ReduceOp::Sum, &[0], true).unwrap();
        drop(handle);
        let stats = profiler.stop().unwrap();
        assert_eq!(profiler.running_ops(), 1);
        assert_eq!(stats.time, 0.0);
    }

    #[test]
    fn test_nested_collectives_timed_once() {
        let (backend, profiler) = sleepy(10);
        let mut a = Tensor::zeros(&[4], DType::F32);
        let mut b = Tensor::zeros(&[4], DType::F32);
        profiler.start().unwrap();
        let outer = backend
            .all_reduce(&mut a, ReduceOp::Sum, &[0], true)
            .unwrap()
            .expect("handle");
        backend.all_reduce(&mut b, ReduceOp::Sum, &[0], false).unwrap();
        // the inner sync call must not close the outer span
        assert_eq!(profiler.stats().time, 0.0);
        outer.wait().unwrap();
        let stats = profiler.stop().unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.time >= 0.02);
        assert!(stats.time < 5.0);
    }

    #[test]
    fn test_failed_collective_completes() {
        let profiler = CommProfiler::new();
        let backend = ProfilingBackend::new(Arc::new(MockBackend::single()), profiler.clone());
        let mut t = Tensor::zeros(&[4], DType::F32);
        profiler.start().unwrap();
        let Err(err) = backend.broadcast(&mut t, 3, &[0], false) else {
            panic!("broadcast from a non-member succeeded");
        };
        assert!(matches!(err, CommError::RankNotInGroup { rank: 3, .. }));
        assert_eq!(profiler.running_ops(), 0);
        assert_eq!(profiler.stop().unwrap().count, 1);
    }

    #[test]
    fn test_volume_per_primitive() {
        let profiler = CommProfiler::new();
        let backend = ProfilingBackend::new(Arc::new(MockBackend::single()), profiler.clone());
        let mut t = Tensor::zeros(&[1024], DType::F32);

        profiler.start().unwrap();
        backend.broadcast(&mut t, 0, &[0], false).unwrap();
        backend.reduce(&mut t, 0, ReduceOp::Sum, &[0], false).unwrap();
        backend.all_reduce(&mut t, ReduceOp::Sum, &[0], false).unwrap();
        let stats = profiler.stop().unwrap();

        // rooted primitives charge the full payload; all-reduce at P=1 moves nothing
        assert_eq!(stats.count, 3);
        assert_eq!(stats.volume, 2.0 * 4096.0);
    }

    #[test]
    fn test_gather_scatter_volume_two_ranks() {
        let handles: Vec<_> = MockBackend::create_world(2)
            .into_iter()
            .map(|b| {
                thread::spawn(move || {
                    let profiler = CommProfiler::new();
                    let backend = ProfilingBackend::new(Arc::new(b), profiler.clone());
                    let input = Tensor::zeros(&[8], DType::F64);
                    let mut outputs = vec![Tensor::zeros(&[8], DType::F64); 2];
                    let mut out = Tensor::zeros(&[8], DType::F64);

                    profiler.start().unwrap();
                    backend.all_gather(&mut outputs, &input, &[0, 1], false).unwrap();
                    backend
                        .reduce_scatter(&mut out, &outputs, ReduceOp::Sum, &[0, 1], false)
                        .unwrap();
                    profiler.stop().unwrap()
                })
            })
            .collect();
        for h in handles {
            let stats = h.join().unwrap();
            assert_eq!(stats.count, 2);
            // (2-1)/2 * 128 bytes, twice
            assert_eq!(stats.volume, 128.0);
        }
    }

    #[test]
    fn test_delegates_metadata() {
        let backend = ProfilingBackend::new(Arc::new(MockBackend::single()), CommProfiler::new());
        assert_eq!(backend.name(), "mock");
        assert_eq!(backend.rank(), 0);
        assert_eq!(backend.world_size(), 1);
        backend.barrier(&[0]).unwrap();
    }
}
