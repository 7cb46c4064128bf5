//! Train - Benchmark Launch Command
//!
//! Spawns one thread per simulated rank over a shared mock backend world,
//! runs the benchmark on every rank and prints rank 0's epoch reports.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parabench::distributed::{Backend, MockBackend};
use parabench::{run_benchmark, EpochReport, TrainConfig, TrainResult, TrainingContext};
use tracing::info_span;

use super::utils::{print_header, print_info, print_kv, print_success, ProgressObserver};
use crate::cli::TrainArgs;
use crate::config::resolve;
use crate::error::{CliError, CliResult};

// =============================================================================
// Execute Command
// =============================================================================

/// Execute the `train` command
pub fn execute(args: TrainArgs, quiet: bool) -> CliResult<()> {
    if !args.backend.eq_ignore_ascii_case("mock") {
        return Err(CliError::InvalidArgument(format!(
            "unsupported backend '{}' (available: mock)",
            args.backend
        )));
    }
    let config = resolve(&args)?;

    if !quiet {
        print_header("Parabench Training Benchmark");
        print_config(&config);
        println!();
    }

    let progress = !quiet && !args.no_progress;
    let start = Instant::now();
    let reports = launch(&config, progress)?;

    for report in &reports {
        println!("{report}");
    }

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&reports)?)?;
        if !quiet {
            print_info(&format!("Reports written to {}", path.display()));
        }
    }
    if !quiet {
        print_success(&format!(
            "Benchmark completed in {:.2}s",
            start.elapsed().as_secs_f64()
        ));
    }
    Ok(())
}

fn print_config(config: &TrainConfig) {
    print_kv("Model", config.model.name());
    print_kv("World size", &config.world_size.to_string());
    print_kv(
        "Tensor parallel",
        &format!("{} x {}", config.tensor_parallel, config.tensor_parallel_size),
    );
    print_kv("Batch size", &config.batch_size.to_string());
    print_kv("Epochs", &config.num_epochs.to_string());
    print_kv("Metric", config.metric_kind().name());
    print_kv("Mixed precision", &config.use_mixed_precision.to_string());
    print_kv(
        "Learning rate",
        &format!("{} ({}, {} warmup steps)", config.learning_rate, config.lr_schedule, config.warmup_steps),
    );
    print_kv("Comm profiler", &config.use_comm_profiler.to_string());
    print_kv("Memory tracker", &config.use_mem_tracker.to_string());
}

// =============================================================================
// Rank Launch
// =============================================================================

/// Runs the benchmark on every rank and returns rank 0's reports.
fn launch(config: &TrainConfig, progress: bool) -> CliResult<Vec<EpochReport>> {
    let handles: Vec<_> = MockBackend::create_world(config.world_size)
        .into_iter()
        .enumerate()
        .map(|(rank, backend)| {
            let config = config.clone();
            thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn(move || run_rank(backend, config, progress && rank == 0))
        })
        .collect::<Result<_, _>>()?;

    let mut main_reports = None;
    for (rank, handle) in handles.into_iter().enumerate() {
        let reports = handle.join().map_err(|_| CliError::RankPanicked(rank))??;
        if rank == 0 {
            main_reports = Some(reports);
        }
    }
    main_reports.ok_or_else(|| CliError::InvalidArgument("world_size must be at least 1".to_string()))
}

fn run_rank(backend: MockBackend, config: TrainConfig, progress: bool) -> TrainResult<Vec<EpochReport>> {
    let rank = backend.rank();
    let _span = info_span!("rank", rank).entered();
    let mut ctx = TrainingContext::new(Arc::new(backend), config)?;
    if progress {
        run_benchmark(&mut ctx, &mut ProgressObserver::new())
    } else {
        run_benchmark(&mut ctx, &mut ())
    }
}
