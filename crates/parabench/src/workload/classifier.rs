//! Synthetic Classifier - Softmax Regression over Gaussian Features
//!
//! Labels come from a fixed random projection of the features, so the task
//! is learnable and accuracy rises over the epochs.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::ParallelContext;
use parabench_tensor::{DType, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{
    batch_rng, cross_entropy_grad, softmax_cross_entropy, target_indices, Parameters, SgdOptions,
    Split, StepOutput, Workload,
};
use crate::config::TrainConfig;
use crate::error::{TrainError, TrainResult};
use crate::scaler::GradScaler;

/// Softmax regression `x W + b` on synthetic data.
#[derive(Debug, Clone)]
pub struct SyntheticClassifier {
    features: usize,
    classes: usize,
    batch_size: usize,
    train_steps: usize,
    eval_steps: usize,
    seed: u64,
    replica: usize,
    projection: Vec<f64>,
    params: Parameters,
    options: SgdOptions,
    last_inputs: Vec<f64>,
}

impl SyntheticClassifier {
    /// Creates the workload for data-parallel replica `replica`.
    #[must_use]
    pub fn new(config: &TrainConfig, replica: usize) -> Self {
        let features = config.shape.num_features;
        let classes = config.shape.num_classes;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let projection = (0..features * classes)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let mut values: Vec<f64> = (0..features * classes)
            .map(|_| 0.01 * rng.sample::<f64, _>(StandardNormal))
            .collect();
        values.extend(std::iter::repeat(0.0).take(classes));

        Self {
            features,
            classes,
            batch_size: config.batch_size,
            train_steps: config.shape.train_steps,
            eval_steps: config.shape.eval_steps,
            seed: config.seed,
            replica,
            projection,
            params: Parameters::new(values),
            options: SgdOptions::from_config(config),
            last_inputs: Vec::new(),
        }
    }

    fn sample_batch(&self, step: usize, split: Split) -> (Vec<f64>, Vec<usize>) {
        let mut rng = batch_rng(self.seed, split, self.replica, step);
        let inputs: Vec<f64> = (0..self.batch_size * self.features)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let labels = inputs
            .chunks(self.features)
            .map(|x| {
                let scores = matvec(x, &self.projection, self.classes);
                first_argmax(&scores)
            })
            .collect();
        (inputs, labels)
    }
}

/// `x (1 x n) * w (n x cols)`.
fn matvec(x: &[f64], w: &[f64], cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; cols];
    for (xi, row) in x.iter().zip(w.chunks(cols)) {
        for (o, wij) in out.iter_mut().zip(row) {
            *o += xi * wij;
        }
    }
    out
}

fn first_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

impl Workload for SyntheticClassifier {
    fn name(&self) -> &'static str {
        "classifier"
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
        let (weights, bias) = self.params.values.split_at(self.features * self.classes);

        let mut logits = Vec::with_capacity(self.batch_size * self.classes);
        for x in inputs.chunks(self.features) {
            let row = matvec(x, weights, self.classes);
            logits.extend(row.iter().zip(bias).map(|(v, b)| v + b));
        }
        let logits = Tensor::from_vec(logits, &[self.batch_size, self.classes], self.options.precision)?;
        let (loss, _) = softmax_cross_entropy(logits.as_slice(), self.classes, &labels);

        let targets: Vec<f64> = labels.iter().map(|&l| l as f64).collect();
        self.last_inputs = inputs;
        Ok(StepOutput {
            logits,
            targets: Tensor::from_slice(&targets, DType::I64),
            loss,
            batch_size: self.batch_size,
            tokens: self.batch_size,
        })
    }

    fn backward(&mut self, output: &StepOutput, loss_scale: f64) -> TrainResult<()> {
        if self.last_inputs.len() != output.batch_size * self.features {
            return Err(TrainError::Config("backward without a matching forward".to_string()));
        }
        let labels = target_indices(&output.targets);
        let (_, probs) = softmax_cross_entropy(output.logits.as_slice(), self.classes, &labels);
        let dlogits = cross_entropy_grad(&probs, self.classes, &labels, loss_scale);

        let (gw, gb) = self.params.grads.split_at_mut(self.features * self.classes);
        for (x, dl) in self.last_inputs.chunks(self.features).zip(dlogits.chunks(self.classes)) {
            for (xi, grow) in x.iter().zip(gw.chunks_mut(self.classes)) {
                for (g, d) in grow.iter_mut().zip(dl) {
                    *g += xi * d;
                }
            }
            for (g, d) in gb.iter_mut().zip(dl) {
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
