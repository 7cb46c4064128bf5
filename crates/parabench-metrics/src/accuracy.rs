//! Accuracy - Top-1 Accuracy over the Data-Parallel Group
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::{reduce_sum, ParallelContext, ProcessGroup};
use parabench_tensor::{DType, Tensor};

use crate::error::{MetricError, MetricResult};
use crate::metric::Metric;
use crate::scheme::{AccuracyScheme, Counts};

/// Running top-1 accuracy.
#[derive(Debug, Clone)]
pub struct Accuracy {
    scheme: AccuracyScheme,
    data: ProcessGroup,
    total_correct: usize,
    total_samples: usize,
}

impl Accuracy {
    /// Creates an accumulator for the context's tensor-parallel layout.
    pub fn new(ctx: &ParallelContext) -> MetricResult<Self> {
        Ok(Self::with_scheme(
            AccuracyScheme::from_context(ctx)?,
            ctx.data().clone(),
        ))
    }

    /// Creates an accumulator with an explicit scheme and reduction group.
    #[must_use]
    pub fn with_scheme(scheme: AccuracyScheme, data: ProcessGroup) -> Self {
        Self {
            scheme,
            data,
            total_correct: 0,
            total_samples: 0,
        }
    }

    /// Local totals since the last reset.
    #[must_use]
    pub fn local_counts(&self) -> Counts {
        Counts {
            correct: self.total_correct,
            samples: self.total_samples,
        }
    }

    /// The scheme in use.
    #[must_use]
    pub fn scheme(&self) -> &AccuracyScheme {
        &self.scheme
    }
}

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "Accuracy"
    }

    fn reset(&mut self) {
        self.total_correct = 0;
        self.total_samples = 0;
    }

    fn forward(&mut self, logits: &Tensor, targets: &Tensor, _loss: f64) -> MetricResult<f64> {
        let batch = self.scheme.local_correct(logits, targets)?;
        self.total_correct += batch.correct;
        self.total_samples += batch.samples;
        if batch.samples == 0 {
            return Ok(0.0);
        }
        Ok(batch.correct as f64 / batch.samples as f64)
    }

    fn value(&self) -> MetricResult<f64> {
        let totals = Tensor::from_slice(
            &[self.total_correct as f64, self.total_samples as f64],
            DType::F64,
        );
        let reduced = reduce_sum(totals, &self.data)?;
        let values = reduced.as_slice();
        let (correct, samples) = (values[0], values[1]);
        // every rank sees the same global sample count, so all fail together
        if samples == 0.0 {
            return Err(MetricError::Precondition(
                "accuracy requested before any sample was seen".to_string(),
            ));
        }
        Ok(correct / samples)
    }
}
