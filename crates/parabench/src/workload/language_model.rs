//! Synthetic Language Model - Bigram Next-Token Prediction
//!
//! Sequences are drawn from a fixed Markov chain in which every token has one
//! preferred successor. The model is a `vocab x vocab` table of next-token
//! logits, so its loss falls towards the entropy of the chain.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::ParallelContext;
use parabench_tensor::{DType, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{
    batch_rng, cross_entropy_grad, softmax_cross_entropy, target_indices, Parameters, SgdOptions,
    Split, StepOutput, Workload,
};
use crate::config::TrainConfig;
use crate::error::{TrainError, TrainResult};
use crate::scaler::GradScaler;

/// Probability of following the preferred successor.
const FOLLOW_PROB: f64 = 0.8;

/// Bigram model over a synthetic Markov corpus.
#[derive(Debug, Clone)]
pub struct SyntheticLanguageModel {
    vocab: usize,
    seq_len: usize,
    batch_size: usize,
    train_steps: usize,
    eval_steps: usize,
    seed: u64,
    replica: usize,
    successor: Vec<usize>,
    params: Parameters,
    options: SgdOptions,
    last_inputs: Vec<usize>,
}

impl SyntheticLanguageModel {
    /// Creates the workload for data-parallel replica `replica`.
    #[must_use]
    pub fn new(config: &TrainConfig, replica: usize) -> Self {
        let vocab = config.shape.vocab_size;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut successor: Vec<usize> = (0..vocab).collect();
        successor.shuffle(&mut rng);
        let values = (0..vocab * vocab)
            .map(|_| 0.01 * rng.sample::<f64, _>(StandardNormal))
            .collect();

        Self {
            vocab,
            seq_len: config.shape.seq_len,
            batch_size: config.batch_size,
            train_steps: config.shape.train_steps,
            eval_steps: config.shape.eval_steps,
            seed: config.seed,
            replica,
            successor,
            params: Parameters::new(values),
            options: SgdOptions::from_config(config),
            last_inputs: Vec::new(),
        }
    }

    /// Inputs and next-token targets, `batch * seq_len` each.
    fn sample_batch(&self, step: usize, split: Split) -> (Vec<usize>, Vec<usize>) {
        let mut rng = batch_rng(self.seed, split, self.replica, step);
        let n = self.batch_size * self.seq_len;
        let mut inputs = Vec::with_capacity(n);
        let mut targets = Vec::with_capacity(n);
        for _ in 0..self.batch_size {
            let mut token = rng.gen_range(0..self.vocab);
            for _ in 0..self.seq_len {
                let next = if rng.gen_bool(FOLLOW_PROB) {
                    self.successor[token]
                } else {
                    rng.gen_range(0..self.vocab)
                };
                inputs.push(token);
                targets.push(next);
                token = next;
            }
        }
        (inputs, targets)
    }
}

impl Workload for SyntheticLanguageModel {
    fn name(&self) -> &'static str {
        "language_model"
    }

    fn parameters(&self) -> &[f64] {
        &self.params.values
    }

    fn learning_rate(&self) -> f64 {
        self.options.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.options.learning_rate = lr;
    }

    fn train_steps(&self) -> usize {
        self.train_steps
    }

    fn eval_steps(&self) -> usize {
        self.eval_steps
    }

    fn forward(&mut self, step: usize, split: Split) -> TrainResult<StepOutput> {
        let (inputs, labels) = self.sample_batch(step, split);
        let mut logits = Vec::with_capacity(inputs.len() * self.vocab);
        for &token in &inputs {
            logits.extend_from_slice(&self.params.values[token * self.vocab..(token + 1) * self.vocab]);
        }
        let logits = Tensor::from_vec(
            logits,
            &[self.batch_size, self.seq_len, self.vocab],
            self.options.precision,
        )?;
        let (loss, _) = softmax_cross_entropy(logits.as_slice(), self.vocab, &labels);

        let targets: Vec<f64> = labels.iter().map(|&l| l as f64).collect();
        self.last_inputs = inputs;
        Ok(StepOutput {
            logits,
            targets: Tensor::from_vec(targets, &[self.batch_size, self.seq_len], DType::I64)?,
            loss,
            batch_size: self.batch_size,
            tokens: self.batch_size * self.seq_len,
        })
    }

    fn backward(&mut self, output: &StepOutput, loss_scale: f64) -> TrainResult<()> {
        if self.last_inputs.len() != output.tokens {
            return Err(TrainError::Config("backward without a matching forward".to_string()));
        }
        let labels = target_indices(&output.targets);
        let (_, probs) = softmax_cross_entropy(output.logits.as_slice(), self.vocab, &labels);
        let dlogits = cross_entropy_grad(&probs, self.vocab, &labels, loss_scale);

        for (&token, dl) in self.last_inputs.iter().zip(dlogits.chunks(self.vocab)) {
            let row = &mut self.params.grads[token * self.vocab..(token + 1) * self.vocab];
            for (g, d) in row.iter_mut().zip(dl) {
                *g += d;
            }
        }
        Ok(())
    }

    fn optimizer_step(
        &mut self,
        parallel: &ParallelContext,
        scaler: &mut GradScaler,
        clip_norm: f64,
    ) -> TrainResult<bool> {
        self.params.step(parallel, scaler, clip_norm, self.options)
    }
}
