//! CLI - Command Line Interface Definitions
//!
//! Defines the CLI structure using clap derive macros.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Parabench - distributed training benchmark with communication profiling
#[derive(Parser, Debug)]
#[command(
    name = "parabench",
    author = "Parabench Development Team",
    version,
    about = "Parabench CLI - Benchmark data- and tensor-parallel training",
    long_about = "Parabench runs a training workload across a simulated multi-rank world and reports \
                  loss, throughput, TFLOPS, the evaluation metric and collective communication cost."
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the training/evaluation benchmark
    Train(TrainArgs),

    /// Show the modelled byte volume of a collective
    Volume(VolumeArgs),

    /// Write a default configuration file
    Init(InitArgs),
}

// =============================================================================
// Train
// =============================================================================

/// Arguments for the `train` command
#[derive(Parser, Debug, Default)]
pub struct TrainArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workload (classifier, language_model, or a vit_*/gpt2_* name)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Samples per data-parallel replica per step
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Upper bound on steps per epoch
    #[arg(short, long)]
    pub steps: Option<usize>,

    /// Learning rate
    #[arg(short, long)]
    pub lr: Option<f64>,

    /// Learning-rate schedule (constant, warmup, cosine)
    #[arg(long)]
    pub lr_schedule: Option<String>,

    /// Linear warmup steps
    #[arg(long)]
    pub warmup_steps: Option<usize>,

    /// Floor of the cosine schedule
    #[arg(long)]
    pub min_lr: Option<f64>,

    /// Weight decay
    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Global gradient-norm clip (0 disables)
    #[arg(long)]
    pub grad_clip: Option<f64>,

    /// Micro-batches per optimizer step
    #[arg(long)]
    pub grad_accum: Option<usize>,

    /// Train in F16 with dynamic loss scaling
    #[arg(long, alias = "mixed-precision")]
    pub amp: bool,

    /// Initial loss scale under --amp
    #[arg(long)]
    pub initial_scale: Option<f64>,

    /// Count activation recomputation in the FLOP model
    #[arg(long)]
    pub activation_checkpoint: bool,

    /// Profile collective communication
    #[arg(long, alias = "use-comm-profiler")]
    pub comm_profiler: bool,

    /// Report peak buffer memory per epoch
    #[arg(long, alias = "use-mem-tracker")]
    pub mem_tracker: bool,

    /// Tensor-parallel mode (none, 1d, 2d, 3d)
    #[arg(long = "tp")]
    pub tensor_parallel: Option<String>,

    /// Ranks per tensor-parallel group
    #[arg(long = "tp-size")]
    pub tensor_parallel_size: Option<usize>,

    /// Number of simulated ranks
    #[arg(short = 'n', long)]
    pub world_size: Option<usize>,

    /// Communication backend
    #[arg(long, default_value = "mock")]
    pub backend: String,

    /// Evaluation metric (accuracy, perplexity)
    #[arg(long)]
    pub metric: Option<String>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the epoch reports as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

// =============================================================================
// Volume
// =============================================================================

/// Collective primitive for the `volume` command
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// All-reduce
    AllReduce,
    /// All-gather
    AllGather,
    /// Reduce-scatter
    ReduceScatter,
    /// Broadcast
    Broadcast,
    /// Reduce
    Reduce,
}

/// Arguments for the `volume` command
#[derive(Parser, Debug)]
pub struct VolumeArgs {
    /// Collective primitive
    #[arg(value_enum)]
    pub primitive: Primitive,

    /// Ranks in the process group
    #[arg(short = 'n', long, default_value = "2")]
    pub group_size: usize,

    /// Payload bytes (per chunk for all-gather and reduce-scatter)
    #[arg(short, long)]
    pub bytes: Option<usize>,

    /// Explicit per-rank chunk sizes for all-gather and reduce-scatter
    #[arg(long, value_delimiter = ',')]
    pub chunks: Vec<usize>,
}

// =============================================================================
// Init
// =============================================================================

/// Arguments for the `init` command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration
    #[arg(default_value = "parabench.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}
