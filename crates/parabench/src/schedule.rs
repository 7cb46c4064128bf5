//! Schedule - Learning Rate Scheduling
//!
//! The scheduler is stepped once per training micro-batch, whether or not
//! the optimizer stepped, and hands the workload the rate for the next one.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrainError;

// =============================================================================
// LrSchedule
// =============================================================================

/// Shape of the learning-rate curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedule {
    /// Fixed rate after warmup.
    #[default]
    Constant,
    /// Linear warmup, then the base rate.
    Warmup,
    /// Linear warmup, then cosine decay to the minimum rate over the run.
    Cosine,
}

impl fmt::Display for LrSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constant => "constant",
            Self::Warmup => "warmup",
            Self::Cosine => "cosine",
        })
    }
}

impl FromStr for LrSchedule {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" | "none" => Ok(Self::Constant),
            "warmup" | "linear_warmup" => Ok(Self::Warmup),
            "cosine" | "cosine_annealing" => Ok(Self::Cosine),
            _ => Err(TrainError::Config(format!("unsupported lr schedule '{s}'"))),
        }
    }
}

// =============================================================================
// LrScheduler
// =============================================================================

/// Per-step learning-rate scheduler.
///
/// During the first `warmup_steps` steps the rate climbs linearly to the base
/// rate, reaching it on the last warmup step:
///
/// `lr = base_lr * (step + 1) / warmup_steps`
///
/// After warmup, [`LrSchedule::Cosine`] follows
///
/// `lr = min_lr + (base_lr - min_lr) * (1 + cos(pi * t)) / 2`
///
/// with `t` the fraction of post-warmup steps taken, clamped to 1.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    schedule: LrSchedule,
    base_lr: f64,
    min_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
    last_lr: f64,
}

impl LrScheduler {
    /// Creates a scheduler for a run of `total_steps` training steps.
    #[must_use]
    pub fn new(
        schedule: LrSchedule,
        base_lr: f64,
        min_lr: f64,
        warmup_steps: usize,
        total_steps: usize,
    ) -> Self {
        let mut scheduler = Self {
            schedule,
            base_lr,
            min_lr,
            warmup_steps,
            total_steps,
            current_step: 0,
            last_lr: base_lr,
        };
        scheduler.last_lr = scheduler.lr_at(0);
        scheduler
    }

    /// Advances one step and returns the new rate.
    pub fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.last_lr = self.lr_at(self.current_step);
        self.last_lr
    }

    /// Rate for the current step.
    #[must_use]
    pub fn last_lr(&self) -> f64 {
        self.last_lr
    }

    /// Steps taken so far.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * (step + 1) as f64 / self.warmup_steps as f64;
        }
        match self.schedule {
            LrSchedule::Constant | LrSchedule::Warmup => self.base_lr,
            LrSchedule::Cosine => {
                let span = self.total_steps.saturating_sub(self.warmup_steps).max(1);
                let progress = ((step - self.warmup_steps) as f64 / span as f64).min(1.0);
                self.min_lr
                    + (self.base_lr - self.min_lr) * (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let mut s = LrScheduler::new(LrSchedule::Constant, 0.1, 0.0, 0, 10);
        assert_eq!(s.last_lr(), 0.1);
        for _ in 0..20 {
            assert_eq!(s.step(), 0.1);
        }
        assert_eq!(s.current_step(), 20);
    }

    #[test]
    fn test_warmup() {
        let mut s = LrScheduler::new(LrSchedule::Warmup, 1.0, 0.0, 4, 10);
        let mut rates = vec![s.last_lr()];
        rates.extend((0..5).map(|_| s.step()));
        assert_eq!(rates, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_cosine_decays_to_minimum() {
        let mut s = LrScheduler::new(LrSchedule::Cosine, 1.0, 0.1, 0, 4);
        assert_eq!(s.last_lr(), 1.0);
        let rates: Vec<f64> = (0..6).map(|_| s.step()).collect();
        assert!((rates[1] - 0.55).abs() < 1e-12);
        assert!((rates[3] - 0.1).abs() < 1e-12);
        // stays at the floor past the end of the run
        assert!((rates[5] - 0.1).abs() < 1e-12);
        assert!(rates.windows(2).all(|w| w[1] <= w[0] + 1e-12));
    }

    #[test]
    fn test_cosine_with_warmup() {
        let mut s = LrScheduler::new(LrSchedule::Cosine, 1.0, 0.0, 2, 6);
        assert_eq!(s.last_lr(), 0.5);
        assert_eq!(s.step(), 1.0);
        // first post-warmup step is the peak
        assert_eq!(s.step(), 1.0);
        assert!(s.step() < 1.0);
    }

    #[test]
    fn test_parse() {
        assert_eq!("cosine".parse::<LrSchedule>().unwrap(), LrSchedule::Cosine);
        assert_eq!("Warmup".parse::<LrSchedule>().unwrap(), LrSchedule::Warmup);
        assert!("step".parse::<LrSchedule>().is_err());
    }
}
