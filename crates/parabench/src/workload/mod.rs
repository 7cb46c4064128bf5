//! Workloads - Engine Adapters Driven by the Benchmark Loops
//!
//! A [`Workload`] stands in for a model, its data loader and its optimizer.
//! The loops only ever see logits, targets and a scalar loss; everything the
//! workload does with gradients happens behind [`Workload::optimizer_step`],
//! which is also where data-parallel gradient traffic is issued.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

mod classifier;
mod language_model;

pub use classifier::SyntheticClassifier;
pub use language_model::SyntheticLanguageModel;

use std::fmt;

use parabench_distributed::{reduce_mean, ParallelContext};
use parabench_tensor::{DType, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ModelKind, TrainConfig};
use crate::error::TrainResult;
use crate::scaler::GradScaler;

// =============================================================================
// Step Types
// =============================================================================

/// Dataset split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training batches.
    Train,
    /// Held-out batches.
    Eval,
}

impl Split {
    fn tag(self) -> u64 {
        match self {
            Self::Train => 1,
            Self::Eval => 2,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "Train",
            Self::Eval => "Test",
        })
    }
}

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Logits `[batch, ..., classes]`.
    pub logits: Tensor,
    /// Class indices `[batch, ...]`.
    pub targets: Tensor,
    /// Mean cross-entropy of the batch.
    pub loss: f64,
    /// Samples in the batch.
    pub batch_size: usize,
    /// Tokens in the batch.
    pub tokens: usize,
}

// =============================================================================
// Workload Trait
// =============================================================================

/// A model plus data plus optimizer, as seen by the benchmark loops.
pub trait Workload: Send {
    /// Display name.
    fn name(&self) -> &'static str;

    /// Trainable parameter count.
    fn num_parameters(&self) -> usize {
        self.parameters().len()
    }

    /// Flat view of the trainable parameters.
    fn parameters(&self) -> &[f64];

    /// Learning rate of the next optimizer step.
    fn learning_rate(&self) -> f64;

    /// Sets the learning rate, e.g. from a scheduler.
    fn set_learning_rate(&mut self, lr: f64);

    /// Batches available per epoch for training.
    fn train_steps(&self) -> usize;

    /// Batches available per epoch for evaluation.
    fn eval_steps(&self) -> usize;

    /// Runs batch `step` of `split` through the model.
    fn forward(&mut self, step: usize, split: Split) -> TrainResult<StepOutput>;

    /// Accumulates gradients of `loss * loss_scale` for the last forward.
    fn backward(&mut self, output: &StepOutput, loss_scale: f64) -> TrainResult<()>;

    /// Synchronizes gradients across replicas and applies them.
    ///
    /// Returns `false` when the step was skipped because of a gradient overflow.
    fn optimizer_step(
        &mut self,
        parallel: &ParallelContext,
        scaler: &mut GradScaler,
        clip_norm: f64,
    ) -> TrainResult<bool>;
}

/// Builds the configured workload for this rank's data-parallel replica.
pub fn build_workload(config: &TrainConfig, parallel: &ParallelContext) -> Box<dyn Workload> {
    let replica = parallel.data_parallel_rank();
    match config.model {
        ModelKind::Classifier => Box::new(SyntheticClassifier::new(config, replica)),
        ModelKind::LanguageModel => Box::new(SyntheticLanguageModel::new(config, replica)),
    }
}

// =============================================================================
// Shared Pieces
// =============================================================================

/// Optimizer hyper-parameters shared by the synthetic workloads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SgdOptions {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub precision: DType,
}

impl SgdOptions {
    pub(crate) fn from_config(config: &TrainConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            weight_decay: config.weight_decay,
            precision: config.precision(),
        }
    }
}

/// Flat parameter vector with its gradient buffer.
#[derive(Debug, Clone)]
pub(crate) struct Parameters {
    pub values: Vec<f64>,
    pub grads: Vec<f64>,
}

impl Parameters {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        let grads = vec![0.0; values.len()];
        Self { values, grads }
    }

    /// Averages gradients over the data group, unscales, clips and applies SGD.
    pub(crate) fn step(
        &mut self,
        parallel: &ParallelContext,
        scaler: &mut GradScaler,
        clip_norm: f64,
        options: SgdOptions,
    ) -> TrainResult<bool> {
        let n = self.grads.len();
        let local = Tensor::from_vec(std::mem::replace(&mut self.grads, vec![0.0; n]), &[n], options.precision)?;
        let mut grads = reduce_mean(local, parallel.data())?.to_vec();

        let finite = scaler.unscale(&mut grads);
        scaler.update();
        if !finite {
            debug!(scale = scaler.scale(), "gradient overflow, skipping step");
            return Ok(false);
        }

        if clip_norm > 0.0 {
            let norm = grads.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm > clip_norm {
                let coef = clip_norm / (norm + 1e-6);
                for g in &mut grads {
                    *g *= coef;
                }
            }
        }

        for (w, g) in self.values.iter_mut().zip(&grads) {
            *w -= options.learning_rate * (g + options.weight_decay * *w);
        }
        Ok(true)
    }
}

/// Deterministic generator for one batch of one replica.
pub(crate) fn batch_rng(seed: u64, split: Split, replica: usize, step: usize) -> StdRng {
    let mixed = seed
        ^ split.tag().rotate_left(56)
        ^ (replica as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (step as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(mixed)
}

/// Row-wise softmax cross-entropy.
///
/// Returns the mean loss and the softmax probabilities.
pub(crate) fn softmax_cross_entropy(logits: &[f64], cols: usize, targets: &[usize]) -> (f64, Vec<f64>) {
    let mut probs = Vec::with_capacity(logits.len());
    let mut total = 0.0;
    for (row, &target) in logits.chunks(cols).zip(targets) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = row.iter().map(|&v| (v - max).exp()).collect();
        let denom: f64 = exps.iter().sum();
        total += denom.ln() + max - row[target];
        probs.extend(exps.iter().map(|e| e / denom));
    }
    let rows = targets.len().max(1);
    (total / rows as f64, probs)
}

/// Gradient of the mean cross-entropy w.r.t. the logits, times `scale`.
pub(crate) fn cross_entropy_grad(probs: &[f64], cols: usize, targets: &[usize], scale: f64) -> Vec<f64> {
    let rows = targets.len().max(1) as f64;
    let mut grad = probs.to_vec();
    for (row, &target) in grad.chunks_mut(cols).zip(targets) {
        row[target] -= 1.0;
        for g in row.iter_mut() {
            *g *= scale / rows;
        }
    }
    grad
}

/// Target indices carried by a targets tensor.
pub(crate) fn target_indices(targets: &Tensor) -> Vec<usize> {
    targets.as_slice().iter().map(|&t| t as usize).collect()
}

// =============================================================================
// Tests
// =============================================================================
