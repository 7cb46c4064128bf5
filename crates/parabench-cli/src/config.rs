//! Config - Configuration File Handling
//!
//! Loads a [`TrainConfig`] from TOML or JSON and layers command line flags
//! on top of it. Flags always win over file values.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fs;
use std::path::Path;

use parabench::distributed::TensorParallelMode;
use parabench::metrics::MetricKind;
use parabench::{LrSchedule, ModelKind, TrainConfig};

use crate::cli::TrainArgs;
use crate::error::{CliError, CliResult};

// =============================================================================
// Loading
// =============================================================================

/// Reads a configuration file, choosing the format by extension.
pub fn load_file(path: &Path) -> CliResult<TrainConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).map_err(|e| CliError::Config(e.to_string()))
    } else {
        Ok(toml::from_str(&content)?)
    }
}

/// Builds the run configuration from an optional file plus flag overrides.
pub fn resolve(args: &TrainArgs) -> CliResult<TrainConfig> {
    let mut config = match &args.config {
        Some(path) => load_file(path)?,
        None => TrainConfig::default(),
    };
    apply_overrides(&mut config, args)?;
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Overrides
// =============================================================================

fn apply_overrides(config: &mut TrainConfig, args: &TrainArgs) -> CliResult<()> {
    if let Some(model) = &args.model {
        config.model = model.parse::<ModelKind>()?;
    }
    if let Some(v) = args.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = args.epochs {
        config.num_epochs = v;
    }
    if let Some(v) = args.steps {
        config.steps_per_epoch = Some(v);
    }
    if let Some(v) = args.lr {
        config.learning_rate = v;
    }
    if let Some(schedule) = &args.lr_schedule {
        config.lr_schedule = schedule.parse::<LrSchedule>()?;
    }
    if let Some(v) = args.warmup_steps {
        config.warmup_steps = v;
    }
    if let Some(v) = args.min_lr {
        config.min_learning_rate = v;
    }
    if let Some(v) = args.weight_decay {
        config.weight_decay = v;
    }
    if let Some(v) = args.grad_clip {
        config.gradient_clipping = v;
    }
    if let Some(v) = args.grad_accum {
        config.gradient_accumulation = v;
    }
    if args.amp {
        config.use_mixed_precision = true;
    }
    if let Some(v) = args.initial_scale {
        config.fp16.initial_scale = v;
    }
    if args.activation_checkpoint {
        config.use_activation_checkpoint = true;
    }
    if args.comm_profiler {
        config.use_comm_profiler = true;
    }
    if args.mem_tracker {
        config.use_mem_tracker = true;
    }
    if let Some(mode) = &args.tensor_parallel {
        config.tensor_parallel = mode
            .parse::<TensorParallelMode>()
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    }
    if let Some(v) = args.tensor_parallel_size {
        config.tensor_parallel_size = v;
    }
    if let Some(v) = args.world_size {
        config.world_size = v;
    }
    if let Some(metric) = &args.metric {
        config.metric = Some(
            metric
                .parse::<MetricKind>()
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?,
        );
    }
    if let Some(v) = args.seed {
        config.seed = v;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
