//! Benchmark Arithmetic - FLOP and Throughput Models
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use parabench_profile::EPSILON;

/// Achieved TFLOPS of a dense model with `numel` parameters over `tokens`.
///
/// One token costs `2 * numel` FLOPs forward; a backward pass doubles that
/// again and activation checkpointing adds one more forward.
#[must_use]
pub fn calc_tflops(numel: usize, tokens: usize, seconds: f64, with_backward: bool, checkpoint: bool) -> f64 {
    let factor = match (with_backward, checkpoint) {
        (false, _) => 1.0,
        (true, false) => 3.0,
        (true, true) => 4.0,
    };
    2.0 * numel as f64 * tokens as f64 * factor / (seconds + EPSILON) / 1e12
}

/// Samples per second, guarded against zero elapsed time.
#[must_use]
pub fn throughput(samples: f64, seconds: f64) -> f64 {
    samples / (seconds + EPSILON)
}

/// Human-readable parameter count (`"12.345 M"`, `"1.300 B"`).
#[must_use]
pub fn format_param_count(numel: usize) -> String {
    let n = numel as f64;
    if n < 1e9 {
        format!("{:.3} M", n / 1e6)
    } else {
        format!("{:.3} B", n / 1e9)
    }
}
