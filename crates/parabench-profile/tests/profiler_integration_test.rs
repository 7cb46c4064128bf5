//! Integration tests for profiling collectives across a simulated world.

use std::sync::Arc;
use std::thread;

use parabench_distributed::{
    all_reduce_sum, reduce_mean_scalar, MockBackend, ParallelContext, ProcessGroup,
    TensorParallelMode,
};
use parabench_profile::{CommProfiler, CommStats, ProfilingBackend};
use parabench_tensor::{DType, Tensor};

fn profiled_world(world: usize) -> Vec<(ProfilingBackend, CommProfiler)> {
    MockBackend::create_world(world)
        .into_iter()
        .map(|b| {
            let profiler = CommProfiler::new();
            (ProfilingBackend::new(Arc::new(b), profiler.clone()), profiler)
        })
        .collect()
}

#[test]
fn test_four_ranks_each_track_their_own_all_reduce() {
    let handles: Vec<_> = profiled_world(4)
        .into_iter()
        .map(|(backend, profiler)| {
            thread::spawn(move || {
                let pg = ProcessGroup::new(Arc::new(backend));
                let mut t = Tensor::from_vec(vec![1.0; 1024], &[1024], DType::F32).unwrap();

                profiler.reset();
                profiler.start().unwrap();
                all_reduce_sum(&mut t, &pg).unwrap();
                let stats = profiler.stop().unwrap();
                (stats, t.as_slice()[0])
            })
        })
        .collect();

    let results: Vec<(CommStats, f64)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.len(), 4);
    for (stats, value) in &results {
        assert_eq!(*value, 4.0);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.volume, 2.0 * 0.75 * 4096.0);
        assert!(stats.time > 0.0);
    }

    let total_count: usize = results.iter().map(|(s, _)| s.count).sum();
    let total_volume: f64 = results.iter().map(|(s, _)| s.volume).sum();
    assert_eq!(total_count, 4);
    assert_eq!(total_volume, 24576.0);
}

#[test]
fn test_reducer_traffic_is_profiled_on_data_group_only() {
    // 4 ranks, tensor parallel of 2: data groups have 2 members
    let handles: Vec<_> = profiled_world(4)
        .into_iter()
        .map(|(backend, profiler)| {
            thread::spawn(move || {
                let ctx =
                    ParallelContext::new(Arc::new(backend), TensorParallelMode::OneD, 2).unwrap();
                profiler.start().unwrap();
                let mean = reduce_mean_scalar(ctx.rank() as f64, ctx.data()).unwrap();
                (mean, profiler.stop().unwrap())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results[0].0, 1.0);
    assert_eq!(results[1].0, 2.0);
    for (_, stats) in results {
        assert_eq!(stats.count, 1);
        // one f64 scalar over a 2-member group: 2 * 1/2 * 8 bytes
        assert_eq!(stats.volume, 8.0);
    }
}

#[test]
fn test_single_rank_reducer_issues_nothing() {
    let (backend, profiler) = profiled_world(1).remove(0);
    let pg = ProcessGroup::new(Arc::new(backend));
    profiler.start().unwrap();
    assert_eq!(reduce_mean_scalar(3.5, &pg).unwrap(), 3.5);
    assert_eq!(profiler.stop().unwrap(), CommStats::default());
}

#[test]
fn test_profile_scope_macro_closes_window() {
    fn body(profiler: &CommProfiler, pg: &ProcessGroup) -> Result<(), Box<dyn std::error::Error>> {
        parabench_profile::profile_scope!(profiler);
        let mut t = Tensor::scalar(1.0, DType::F32);
        all_reduce_sum(&mut t, pg)?;
        Ok(())
    }

    let (backend, profiler) = profiled_world(1).remove(0);
    let pg = ProcessGroup::new(Arc::new(backend));
    body(&profiler, &pg).unwrap();
    assert!(!profiler.is_active());
    assert_eq!(profiler.stats().count, 1);
}
