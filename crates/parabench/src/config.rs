//! Config - Benchmark Run Configuration
//!
//! Every field has a default, so a partial TOML file (or none at all) is a
//! valid configuration. Call [`TrainConfig::validate`] before building a
//! [`TrainingContext`](crate::TrainingContext).
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::str::FromStr;

use parabench_distributed::{ShardGrid, TensorParallelMode};
use parabench_metrics::MetricKind;
use parabench_tensor::DType;
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};
use crate::scaler::ScalerConfig;
use crate::schedule::LrSchedule;

// =============================================================================
// Model Kind
// =============================================================================

/// Which synthetic workload to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Image-classification style softmax regression (stands in for ViT).
    #[default]
    #[serde(alias = "vit")]
    Classifier,
    /// Next-token bigram model (stands in for GPT-2).
    #[serde(alias = "gpt2")]
    LanguageModel,
}

impl ModelKind {
    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::LanguageModel => "language_model",
        }
    }

    /// Metric reported when none is configured.
    #[must_use]
    pub const fn default_metric(self) -> MetricKind {
        match self {
            Self::Classifier => MetricKind::Accuracy,
            Self::LanguageModel => MetricKind::Perplexity,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = TrainError;

    /// Accepts the family prefix of names such as `vit_small` or `gpt2_medium`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let family = lower.split('_').next().unwrap_or_default();
        match (lower.as_str(), family) {
            ("classifier", _) | (_, "vit") => Ok(Self::Classifier),
            ("language_model" | "lm", _) | (_, "gpt2") => Ok(Self::LanguageModel),
            _ => Err(TrainError::Config(format!("unsupported model '{s}'"))),
        }
    }
}

// =============================================================================
// Workload Shape
// =============================================================================

/// Dimensions of the synthetic workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelShape {
    /// Input features of the classifier.
    pub num_features: usize,
    /// Classes of the classifier.
    pub num_classes: usize,
    /// Vocabulary of the language model.
    pub vocab_size: usize,
    /// Tokens per sample of the language model.
    pub seq_len: usize,
    /// Batches per epoch in the training split.
    pub train_steps: usize,
    /// Batches per epoch in the evaluation split.
    pub eval_steps: usize,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            num_features: 64,
            num_classes: 16,
            vocab_size: 64,
            seq_len: 16,
            train_steps: 50,
            eval_steps: 10,
        }
    }
}

// =============================================================================
// TrainConfig
// =============================================================================

/// Configuration of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Workload to run.
    pub model: ModelKind,
    /// Workload dimensions.
    pub shape: ModelShape,
    /// Samples per data-parallel replica per step.
    pub batch_size: usize,
    /// Epochs (one train and one eval pass each).
    pub num_epochs: usize,
    /// Upper bound on steps per epoch.
    pub steps_per_epoch: Option<usize>,
    /// SGD learning rate (peak rate under a schedule).
    pub learning_rate: f64,
    /// Learning-rate curve over the run.
    pub lr_schedule: LrSchedule,
    /// Linear warmup steps at the start of the run.
    pub warmup_steps: usize,
    /// Floor of the cosine schedule.
    pub min_learning_rate: f64,
    /// L2 weight decay.
    pub weight_decay: f64,
    /// Global gradient-norm clip; 0 disables clipping.
    pub gradient_clipping: f64,
    /// Micro-batches per optimizer step.
    pub gradient_accumulation: usize,
    /// Run logits and gradients in F16 with dynamic loss scaling.
    pub use_mixed_precision: bool,
    /// Count activation recomputation in the FLOP model.
    pub use_activation_checkpoint: bool,
    /// Loss-scaling parameters for mixed precision.
    pub fp16: ScalerConfig,
    /// Profile collective traffic.
    pub use_comm_profiler: bool,
    /// Track peak buffer memory per epoch.
    pub use_mem_tracker: bool,
    /// Evaluation metric; defaults to the workload's natural metric.
    pub metric: Option<MetricKind>,
    /// Tensor-parallel layout.
    pub tensor_parallel: TensorParallelMode,
    /// Ranks per tensor-parallel group.
    pub tensor_parallel_size: usize,
    /// Number of simulated ranks.
    pub world_size: usize,
    /// Seed for parameters and data.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            shape: ModelShape::default(),
            batch_size: 32,
            num_epochs: 1,
            steps_per_epoch: None,
            learning_rate: 0.1,
            lr_schedule: LrSchedule::default(),
            warmup_steps: 0,
            min_learning_rate: 0.0,
            weight_decay: 0.0,
            gradient_clipping: 0.0,
            gradient_accumulation: 1,
            use_mixed_precision: false,
            use_activation_checkpoint: false,
            fp16: ScalerConfig::default(),
            use_comm_profiler: false,
            use_mem_tracker: false,
            metric: None,
            tensor_parallel: TensorParallelMode::None,
            tensor_parallel_size: 1,
            world_size: 1,
            seed: 1024,
        }
    }
}

impl TrainConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the workload.
    #[must_use]
    pub fn model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    /// Builder: set the per-replica batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder: set the number of epochs.
    #[must_use]
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.num_epochs = epochs;
        self
    }

    /// Builder: cap steps per epoch.
    #[must_use]
    pub fn steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = Some(steps);
        self
    }

    /// Builder: set the world and tensor-parallel layout.
    #[must_use]
    pub fn parallel(mut self, world_size: usize, mode: TensorParallelMode, tp_size: usize) -> Self {
        self.world_size = world_size;
        self.tensor_parallel = mode;
        self.tensor_parallel_size = tp_size;
        self
    }

    /// Builder: enable the communication profiler.
    #[must_use]
    pub fn comm_profiler(mut self, enabled: bool) -> Self {
        self.use_comm_profiler = enabled;
        self
    }

    /// Builder: enable the memory tracker.
    #[must_use]
    pub fn mem_tracker(mut self, enabled: bool) -> Self {
        self.use_mem_tracker = enabled;
        self
    }

    /// Builder: set the learning-rate schedule and its warmup.
    #[must_use]
    pub fn lr_schedule(mut self, schedule: LrSchedule, warmup_steps: usize) -> Self {
        self.lr_schedule = schedule;
        self.warmup_steps = warmup_steps;
        self
    }

    /// Builder: enable mixed precision.
    #[must_use]
    pub fn mixed_precision(mut self, enabled: bool) -> Self {
        self.use_mixed_precision = enabled;
        self
    }

    /// Builder: set gradient accumulation steps.
    #[must_use]
    pub fn gradient_accumulation(mut self, steps: usize) -> Self {
        self.gradient_accumulation = steps;
        self
    }

    /// Builder: set the metric.
    #[must_use]
    pub fn metric(mut self, metric: MetricKind) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Builder: set the seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Metric to report.
    #[must_use]
    pub fn metric_kind(&self) -> MetricKind {
        self.metric.unwrap_or_else(|| self.model.default_metric())
    }

    /// Dtype of logits, gradients and gradient traffic.
    #[must_use]
    pub fn precision(&self) -> DType {
        if self.use_mixed_precision {
            DType::F16
        } else {
            DType::F32
        }
    }

    /// Size of the last logits dimension (classes or vocabulary).
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        match self.model {
            ModelKind::Classifier => self.shape.num_classes,
            ModelKind::LanguageModel => self.shape.vocab_size,
        }
    }

    /// Steps to run for a split with `available` batches.
    #[must_use]
    pub fn num_steps(&self, available: usize) -> usize {
        match self.steps_per_epoch {
            Some(cap) if cap < available => cap,
            _ => available,
        }
    }

    /// Checks the configuration for values the loops cannot run with.
    pub fn validate(&self) -> TrainResult<()> {
        let fail = |msg: String| Err(TrainError::Config(msg));
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".to_string());
        }
        if self.world_size == 0 {
            return fail("world_size must be at least 1".to_string());
        }
        if self.gradient_accumulation == 0 {
            return fail("gradient_accumulation must be at least 1".to_string());
        }
        if self.steps_per_epoch == Some(0) {
            return fail("steps_per_epoch must be at least 1".to_string());
        }
        if self.shape.train_steps == 0 || self.shape.eval_steps == 0 {
            return fail("train_steps and eval_steps must be at least 1".to_string());
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(0.0..=self.learning_rate).contains(&self.min_learning_rate) {
            return fail(format!(
                "min_learning_rate must lie in [0, {}], got {}",
                self.learning_rate, self.min_learning_rate
            ));
        }
        if self.weight_decay < 0.0 || self.gradient_clipping < 0.0 {
            return fail("weight_decay and gradient_clipping must be non-negative".to_string());
        }
        if self.use_mixed_precision && self.fp16.initial_scale <= 0.0 {
            return fail("fp16 initial_scale must be positive".to_string());
        }
        let dims = match self.model {
            ModelKind::Classifier => [self.shape.num_features, self.shape.num_classes],
            ModelKind::LanguageModel => [self.shape.vocab_size, self.shape.seq_len],
        };
        if dims.contains(&0) {
            return fail(format!("{} dimensions must be non-zero", self.model));
        }
        Ok(())
    }

    /// Checks that batches and logits split evenly over a 2D/3D shard grid.
    pub fn validate_shards(&self, grid: &ShardGrid) -> TrainResult<()> {
        let rows = grid.batch_shards();
        if self.batch_size % rows != 0 {
            return Err(TrainError::Config(format!(
                "batch_size {} is not divisible by the {rows} row shards of the {} layout",
                self.batch_size, self.tensor_parallel
            )));
        }
        let cols = grid.class_shards();
        if self.num_outputs() % cols != 0 {
            let what = match self.model {
                ModelKind::Classifier => "num_classes",
                ModelKind::LanguageModel => "vocab_size",
            };
            return Err(TrainError::Config(format!(
                "{what} {} is not divisible by the {cols} class shards of the {} layout",
                self.num_outputs(),
                self.tensor_parallel
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
