//! Utils - Common Utilities for CLI Commands
//!
//! Terminal output helpers and the progress-bar step observer.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use parabench::{Split, StepObserver, StepStats};

// =============================================================================
// Output Formatting
// =============================================================================

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a header
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// =============================================================================
// Progress Bars
// =============================================================================

/// Create an epoch progress bar
pub fn epoch_progress_bar(epoch: usize, split: Split, steps: u64) -> ProgressBar {
    let pb = ProgressBar::new(steps);
    let template = format!(
        "{{spinner:.green}} Epoch {epoch} / {split} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}} ({{eta}})"
    );
    let style = ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb
}

/// Drives one progress bar per epoch from the benchmark loops.
#[derive(Default)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    /// Creates an observer with no bar open.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepObserver for ProgressObserver {
    fn on_epoch_begin(&mut self, epoch: usize, split: Split, steps: usize) {
        self.bar = Some(epoch_progress_bar(epoch, split, steps as u64));
    }

    fn on_step_end(&mut self, stats: &StepStats) {
        if let Some(bar) = &self.bar {
            let msg = match (stats.metric, stats.learning_rate) {
                (Some(metric), _) => format!("loss {:.3} metric {metric:.3}", stats.loss),
                (None, Some(lr)) => format!(
                    "loss {:.3} lr {lr:.2e} {:.1} samples/s",
                    stats.loss, stats.throughput
                ),
                (None, None) => format!("loss {:.3} {:.1} samples/s", stats.loss, stats.throughput),
            };
            bar.set_message(msg);
            bar.inc(1);
        }
    }

    fn on_epoch_end(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
