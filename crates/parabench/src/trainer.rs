//! Trainer - Benchmark Epoch Loops
//!
//! Drives a [`Workload`] through training and evaluation epochs, bracketing
//! each epoch with a communication-profiling window and reducing the epoch
//! statistics over the data-parallel group.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use parabench::{train_epoch, TrainConfig, TrainingContext};
//! use parabench_distributed::MockBackend;
//!
//! let config = TrainConfig::new().batch_size(4).steps_per_epoch(2).comm_profiler(true);
//! let mut ctx = TrainingContext::new(Arc::new(MockBackend::single()), config).unwrap();
//! let report = train_epoch(&mut ctx, 0, &mut ()).unwrap();
//! assert_eq!(report.steps, 2);
//! ```
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parabench_distributed::{reduce_mean_scalar, reduce_sum_scalar, Backend, ParallelContext};
use parabench_metrics::Metric;
use parabench_profile::{CommProfiler, CommStats, MemoryTracker, ProfileWindow, ProfilingBackend};
use parabench_tensor::Tensor;
use serde::Serialize;
use tracing::{debug, info};

use crate::benchmark::{calc_tflops, format_param_count, throughput};
use crate::config::TrainConfig;
use crate::error::{TrainError, TrainResult};
use crate::scaler::GradScaler;
use crate::schedule::LrScheduler;
use crate::workload::{build_workload, Split, StepOutput, Workload};

// =============================================================================
// Training Context
// =============================================================================

/// Everything one rank needs to run the benchmark.
pub struct TrainingContext {
    /// Process groups of this rank.
    pub parallel: ParallelContext,
    /// Collective profiler, when enabled.
    pub profiler: Option<CommProfiler>,
    /// Evaluation metric.
    pub metric: Box<dyn Metric>,
    /// Model, data and optimizer.
    pub workload: Box<dyn Workload>,
    /// Loss scaler (disabled without mixed precision).
    pub scaler: GradScaler,
    /// Learning-rate schedule, stepped every training step.
    pub scheduler: LrScheduler,
    /// Buffer memory tracker, when enabled.
    pub memory: Option<MemoryTracker>,
    /// Run configuration.
    pub config: TrainConfig,
}

impl TrainingContext {
    /// Builds the context for the rank behind `backend`.
    ///
    /// With the profiler enabled, `backend` is wrapped once here and every
    /// collective issued through the context is recorded while a window is open.
    pub fn new(backend: Arc<dyn Backend>, config: TrainConfig) -> TrainResult<Self> {
        config.validate()?;
        if backend.world_size() != config.world_size {
            return Err(TrainError::Config(format!(
                "backend spans {} ranks but world_size is {}",
                backend.world_size(),
                config.world_size
            )));
        }

        let (backend, profiler) = if config.use_comm_profiler {
            let profiler = CommProfiler::new();
            let wrapped: Arc<dyn Backend> =
                Arc::new(ProfilingBackend::new(backend, profiler.clone()));
            (wrapped, Some(profiler))
        } else {
            (backend, None)
        };

        let parallel =
            ParallelContext::new(backend, config.tensor_parallel, config.tensor_parallel_size)?;
        if let Some(grid) = parallel.grid() {
            config.validate_shards(grid)?;
        }
        let metric = config.metric_kind().build(&parallel)?;
        let mut workload = build_workload(&config, &parallel);
        let scaler = if config.use_mixed_precision {
            GradScaler::new(&config.fp16)
        } else {
            GradScaler::disabled()
        };

        let total_steps = config.num_epochs * config.num_steps(workload.train_steps());
        let scheduler = LrScheduler::new(
            config.lr_schedule,
            config.learning_rate,
            config.min_learning_rate,
            config.warmup_steps,
            total_steps,
        );
        workload.set_learning_rate(scheduler.last_lr());

        let memory = config.use_mem_tracker.then(|| {
            let mut tracker = MemoryTracker::new();
            // weights plus their gradient buffer
            let state = 2 * workload.num_parameters() * config.precision().size_of();
            tracker.record_alloc("model_state", state);
            tracker
        });

        if parallel.is_main() {
            info!(
                "Model is built (parameter size = {}).",
                format_param_count(workload.num_parameters())
            );
        }

        Ok(Self {
            parallel,
            profiler,
            metric,
            workload,
            scaler,
            scheduler,
            memory,
            config,
        })
    }

    /// Whether this is global rank 0.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.parallel.is_main()
    }

    fn open_window(&self) -> TrainResult<Option<ProfileWindow>> {
        match &self.profiler {
            Some(profiler) => {
                profiler.reset();
                Ok(Some(profiler.window()?))
            }
            None => Ok(None),
        }
    }

    fn track_alloc(&mut self, name: &str, bytes: usize) {
        if let Some(memory) = self.memory.as_mut() {
            memory.record_alloc(name, bytes);
        }
    }

    fn track_free(&mut self, name: &str, bytes: usize) {
        if let Some(memory) = self.memory.as_mut() {
            memory.record_free(name, bytes);
        }
    }

    /// Cuts logits and targets down to this rank's tensor-parallel shard.
    fn local_shard(&self, output: &StepOutput) -> TrainResult<(Tensor, Tensor)> {
        match self.parallel.grid() {
            Some(grid) => Ok(grid.local_shard(&output.logits, &output.targets)?),
            None => Ok((output.logits.clone(), output.targets.clone())),
        }
    }
}

// =============================================================================
// Step Observer
// =============================================================================

/// Per-step statistics handed to a [`StepObserver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// Step index within the epoch.
    pub step: usize,
    /// Batch loss.
    pub loss: f64,
    /// Forward seconds.
    pub forward_time: f64,
    /// Backward and optimizer seconds (0 in evaluation).
    pub backward_time: f64,
    /// Global samples per second for this step.
    pub throughput: f64,
    /// Achieved TFLOPS for this step.
    pub tflops: f64,
    /// Learning rate used by this step (training only).
    pub learning_rate: Option<f64>,
    /// Batch-local metric value (evaluation only).
    pub metric: Option<f64>,
}

/// Hooks into the epoch loops, e.g. for progress display.
pub trait StepObserver {
    /// Called before the first step of an epoch.
    fn on_epoch_begin(&mut self, _epoch: usize, _split: Split, _steps: usize) {}

    /// Called after every step.
    fn on_step_end(&mut self, _stats: &StepStats) {}

    /// Called after the last step, before any reduction.
    fn on_epoch_end(&mut self) {}
}

impl StepObserver for () {}

// =============================================================================
// Epoch Report
// =============================================================================

/// Globally reduced statistics of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochReport {
    /// Epoch index.
    pub epoch: usize,
    /// Train or eval.
    pub split: Split,
    /// Steps run.
    pub steps: usize,
    /// Mean loss over steps and replicas.
    pub loss: f64,
    /// Samples processed by all replicas.
    pub samples: f64,
    /// Tokens processed by all replicas.
    pub tokens: f64,
    /// Seconds spent inside steps on this rank.
    pub time: f64,
    /// Samples per second.
    pub throughput: f64,
    /// Achieved TFLOPS.
    pub tflops: f64,
    /// Peak buffer bytes of this rank, when tracked.
    pub peak_memory: Option<usize>,
    /// Collective traffic of this rank, when profiled.
    pub comm: Option<CommStats>,
    /// Metric name and global value (evaluation only).
    pub metric: Option<(String, f64)>,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = format!("[Epoch {} / {}]", self.epoch, self.split);
        write!(f, "{tag}: Loss = {:.3}", self.loss)?;
        match &self.metric {
            Some((name, value)) if name == "Accuracy" => {
                write!(f, " | Accuracy = {:.3} %", value * 100.0)?;
            }
            Some((name, value)) => write!(f, " | {name} = {value:.3}")?,
            None => {}
        }
        write!(
            f,
            " | Throughput = {:.3} samples/sec | TFLOPS = {:.3}",
            self.throughput, self.tflops
        )?;
        if let Some(peak) = self.peak_memory {
            write!(f, " | Peak memory = {}", MemoryTracker::format_bytes(peak))?;
        }
        if let Some(comm) = &self.comm {
            write!(f, "\n{tag}: {}", comm.summary(self.time))?;
        }
        Ok(())
    }
}

// =============================================================================
// Epoch Loops
// =============================================================================

/// Runs one training epoch.
pub fn train_epoch(
    ctx: &mut TrainingContext,
    epoch: usize,
    observer: &mut dyn StepObserver,
) -> TrainResult<EpochReport> {
    let steps = ctx.config.num_steps(ctx.workload.train_steps());
    let accumulation = ctx.config.gradient_accumulation;
    let clip = ctx.config.gradient_clipping;
    let checkpoint = ctx.config.use_activation_checkpoint;
    let replicas = ctx.parallel.data_parallel_size() as f64;
    let numel = ctx.workload.num_parameters();
    let grad_bytes = numel * ctx.config.precision().size_of();

    let mut total_loss = 0.0;
    let mut total_time = 0.0;
    let mut samples = 0usize;
    let mut tokens = 0usize;

    observer.on_epoch_begin(epoch, Split::Train, steps);
    if let Some(memory) = ctx.memory.as_mut() {
        memory.start();
    }
    let window = ctx.open_window()?;

    for i in 0..steps {
        let lr = ctx.workload.learning_rate();
        let fwd_start = Instant::now();
        let output = ctx.workload.forward(i, Split::Train)?;
        let fwd_time = fwd_start.elapsed().as_secs_f64();
        let activations = output.logits.nbytes() + output.targets.nbytes();
        ctx.track_alloc("activations", activations);

        let bwd_start = Instant::now();
        ctx.workload.backward(&output, ctx.scaler.scale())?;
        if (i + 1) % accumulation == 0 || i + 1 == steps {
            ctx.track_alloc("gradient_sync", grad_bytes);
            let applied = ctx.workload.optimizer_step(&ctx.parallel, &mut ctx.scaler, clip)?;
            ctx.track_free("gradient_sync", grad_bytes);
            if !applied {
                debug!(epoch, step = i, "optimizer step skipped");
            }
        }
        let next_lr = ctx.scheduler.step();
        ctx.workload.set_learning_rate(next_lr);
        let bwd_time = bwd_start.elapsed().as_secs_f64();
        ctx.track_free("activations", activations);

        let batch_time = fwd_time + bwd_time;
        total_loss += output.loss;
        total_time += batch_time;
        samples += output.batch_size;
        tokens += output.tokens;

        observer.on_step_end(&StepStats {
            step: i,
            loss: output.loss,
            forward_time: fwd_time,
            backward_time: bwd_time,
            throughput: throughput(output.batch_size as f64 * replicas, batch_time),
            tflops: calc_tflops(numel, output.tokens * replicas as usize, batch_time, true, checkpoint),
            learning_rate: Some(lr),
            metric: None,
        });
    }

    observer.on_epoch_end();
    let comm = window.map(ProfileWindow::finish).transpose()?;
    let peak_memory = ctx.memory.as_mut().map(|m| m.stop().peak_usage);

    let data = ctx.parallel.data();
    let loss = reduce_mean_scalar(total_loss, data)? / steps.max(1) as f64;
    let samples = reduce_sum_scalar(samples as f64, data)?;
    let tokens = reduce_sum_scalar(tokens as f64, data)?;

    let report = EpochReport {
        epoch,
        split: Split::Train,
        steps,
        loss,
        samples,
        tokens,
        time: total_time,
        throughput: throughput(samples, total_time),
        tflops: calc_tflops(numel, tokens as usize, total_time, true, checkpoint),
        peak_memory,
        comm,
        metric: None,
    };
    if ctx.is_main() {
        info!("{report}");
    }
    Ok(report)
}

/// Runs one evaluation epoch and reports the configured metric.
pub fn eval_epoch(
    ctx: &mut TrainingContext,
    epoch: usize,
    observer: &mut dyn StepObserver,
) -> TrainResult<EpochReport> {
    let steps = ctx.config.num_steps(ctx.workload.eval_steps());
    let replicas = ctx.parallel.data_parallel_size() as f64;
    let numel = ctx.workload.num_parameters();

    let mut total_loss = 0.0;
    let mut total_time = 0.0;
    let mut samples = 0usize;
    let mut tokens = 0usize;

    ctx.metric.reset();
    observer.on_epoch_begin(epoch, Split::Eval, steps);
    if let Some(memory) = ctx.memory.as_mut() {
        memory.start();
    }
    let window = ctx.open_window()?;

    for i in 0..steps {
        let start = Instant::now();
        let output = ctx.workload.forward(i, Split::Eval)?;
        let activations = output.logits.nbytes() + output.targets.nbytes();
        ctx.track_alloc("activations", activations);
        let (logits, targets) = ctx.local_shard(&output)?;
        let batch_metric = ctx.metric.forward(&logits, &targets, output.loss)?;
        ctx.track_free("activations", activations);
        let batch_time = start.elapsed().as_secs_f64();

        total_loss += output.loss;
        total_time += batch_time;
        samples += output.batch_size;
        tokens += output.tokens;

        observer.on_step_end(&StepStats {
            step: i,
            loss: output.loss,
            forward_time: batch_time,
            backward_time: 0.0,
            throughput: throughput(output.batch_size as f64 * replicas, batch_time),
            tflops: calc_tflops(numel, output.tokens * replicas as usize, batch_time, false, false),
            learning_rate: None,
            metric: Some(batch_metric),
        });
    }

    observer.on_epoch_end();
    let comm = window.map(ProfileWindow::finish).transpose()?;
    let peak_memory = ctx.memory.as_mut().map(|m| m.stop().peak_usage);

    let data = ctx.parallel.data();
    let loss = reduce_mean_scalar(total_loss, data)? / steps.max(1) as f64;
    let samples = reduce_sum_scalar(samples as f64, data)?;
    let tokens = reduce_sum_scalar(tokens as f64, data)?;
    let metric_value = ctx.metric.value()?;

    let report = EpochReport {
        epoch,
        split: Split::Eval,
        steps,
        loss,
        samples,
        tokens,
        time: total_time,
        throughput: throughput(samples, total_time),
        tflops: calc_tflops(numel, tokens as usize, total_time, false, false),
        peak_memory,
        comm,
        metric: Some((ctx.metric.name().to_string(), metric_value)),
    };
    if ctx.is_main() {
        info!("{report}");
    }
    Ok(report)
}

/// Runs every configured epoch (train, then eval) and returns all reports.
pub fn run_benchmark(
    ctx: &mut TrainingContext,
    observer: &mut dyn StepObserver,
) -> TrainResult<Vec<EpochReport>> {
    if ctx.is_main() {
        info!("Benchmark start.");
    }
    let mut reports = Vec::with_capacity(ctx.config.num_epochs * 2);
    for epoch in 0..ctx.config.num_epochs {
        reports.push(train_epoch(ctx, epoch, observer)?);
        reports.push(eval_epoch(ctx, epoch, observer)?);
    }
    if ctx.is_main() {
        info!("Benchmark complete.");
    }
    Ok(reports)
}

// =============================================================================
// Tests
// =============================================================================
