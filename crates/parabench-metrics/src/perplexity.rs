//! Perplexity - Exponentiated Mean Loss over the Data-Parallel Group
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_distributed::{reduce_sum_scalar, ParallelContext, ProcessGroup};
use parabench_tensor::Tensor;

use crate::error::{MetricError, MetricResult};
use crate::metric::Metric;

/// Running perplexity.
///
/// Every rank must see the same number of batches; the mean divides by
/// `cnt * group_size`.
#[derive(Debug, Clone)]
pub struct Perplexity {
    data: ProcessGroup,
    cnt: usize,
    total_loss: f64,
}

impl Perplexity {
    /// Creates an accumulator reducing over the context's data-parallel group.
    #[must_use]
    pub fn new(ctx: &ParallelContext) -> Self {
        Self::with_group(ctx.data().clone())
    }

    /// Creates an accumulator reducing over `data`.
    #[must_use]
    pub fn with_group(data: ProcessGroup) -> Self {
        Self {
            data,
            cnt: 0,
            total_loss: 0.0,
        }
    }

    /// Batches seen since the last reset.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cnt
    }
}

impl Metric for Perplexity {
    fn name(&self) -> &'static str {
        "Perplexity"
    }

    fn reset(&mut self) {
        self.cnt = 0;
        self.total_loss = 0.0;
    }

    fn forward(&mut self, _logits: &Tensor, _targets: &Tensor, loss: f64) -> MetricResult<f64> {
        self.cnt += 1;
        self.total_loss += loss;
        Ok(loss.exp())
    }

    fn value(&self) -> MetricResult<f64> {
        if self.cnt == 0 {
            return Err(MetricError::Precondition(
                "perplexity requested before any forward()".to_string(),
            ));
        }
        let total = reduce_sum_scalar(self.total_loss, &self.data)?;
        Ok((total / (self.cnt * self.data.size()) as f64).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parabench_tensor::DType;

    #[test]
    fn test_value_single_process() {
        let mut ppl = Perplexity::new(&ParallelContext::mock());
        let dummy = Tensor::scalar(0.0, DType::F32);
        assert!((ppl.forward(&dummy, &dummy, 1.0).unwrap() - 1f64.exp()).abs() < 1e-12);
        ppl.forward(&dummy, &dummy, 2.0).unwrap();
        assert!((ppl.value().unwrap() - 1.5f64.exp()).abs() < 1e-12);
        assert_eq!(ppl.count(), 2);
    }

    #[test]
    fn test_value_before_forward_fails() {
        let mut ppl = Perplexity::new(&ParallelContext::mock());
        assert!(matches!(ppl.value(), Err(MetricError::Precondition(_))));
        let dummy = Tensor::scalar(0.0, DType::F32);
        ppl.forward(&dummy, &dummy, 0.5).unwrap();
        ppl.reset();
        assert!(ppl.value().is_err());
    }
}
