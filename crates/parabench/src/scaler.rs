//! Gradient Scaler - Dynamic Loss Scaling for Mixed Precision
//!
//! The loss is multiplied by the current scale before backward so small F16
//! gradients do not flush to zero. Gradients are divided by it again before
//! the optimizer step; an overflow skips the step and backs the scale off.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use serde::{Deserialize, Serialize};

// =============================================================================
// ScalerConfig
// =============================================================================

/// Loss-scaling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    /// Scale used for the first step.
    pub initial_scale: f64,
    /// Multiplier applied after `growth_interval` clean steps.
    pub growth_factor: f64,
    /// Multiplier applied on overflow.
    pub backoff_factor: f64,
    /// Clean steps between growths.
    pub growth_interval: usize,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 32768.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 1000,
        }
    }
}

// =============================================================================
// GradScaler
// =============================================================================

/// Dynamic loss scaler.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    growth_tracker: usize,
    found_inf: bool,
    enabled: bool,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::disabled()
    }
}

impl GradScaler {
    /// Creates an enabled scaler.
    #[must_use]
    pub fn new(config: &ScalerConfig) -> Self {
        Self {
            scale: config.initial_scale,
            growth_factor: config.growth_factor,
            backoff_factor: config.backoff_factor,
            growth_interval: config.growth_interval.max(1),
            growth_tracker: 0,
            found_inf: false,
            enabled: true,
        }
    }

    /// Creates a pass-through scaler with scale 1.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(&ScalerConfig::default())
        }
    }

    /// Current loss scale (1 when disabled).
    #[must_use]
    pub fn scale(&self) -> f64 {
        if self.enabled {
            self.scale
        } else {
            1.0
        }
    }

    /// Whether loss scaling is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the last unscale saw a non-finite gradient.
    #[must_use]
    pub fn found_inf(&self) -> bool {
        self.found_inf
    }

    /// Divides `grads` by the scale; returns `false` if any is inf/nan.
    pub fn unscale(&mut self, grads: &mut [f64]) -> bool {
        self.found_inf = grads.iter().any(|g| !g.is_finite());
        if self.enabled {
            let inv = 1.0 / self.scale;
            for g in grads.iter_mut() {
                *g *= inv;
            }
        }
        !self.found_inf
    }

    /// Adjusts the scale after a step attempt.
    pub fn update(&mut self) {
        if !self.enabled {
            return;
        }
        if self.found_inf {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.growth_tracker = 0;
        } else {
            self.growth_tracker += 1;
            if self.growth_tracker >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.growth_tracker = 0;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
