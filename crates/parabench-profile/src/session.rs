//! Profiling Session - Counters of One Measurement Window
//!
//! The session is busy from the moment the first outstanding collective is
//! issued until the last outstanding one completes. Overlapping collectives
//! only extend that span, so concurrent traffic is never double counted.

use std::time::Instant;

use tracing::warn;

use crate::report::CommStats;
use crate::volume::CollectiveKind;

/// A collective that has been issued but not yet completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCollective {
    /// Which primitive was issued.
    pub kind: CollectiveKind,
    /// Modelled bytes moved.
    pub byte_volume: f64,
    /// Whether completion is deferred to a handle.
    pub is_async: bool,
}

/// Accumulated counters of a profiler.
#[derive(Debug, Clone, Default)]
pub struct ProfilingSession {
    running_ops: usize,
    total_time: f64,
    total_volume: f64,
    total_count: usize,
    window_start: Option<Instant>,
}

impl ProfilingSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issued collective; opens the busy span on a 0 -> 1 transition.
    pub fn issue(&mut self, pending: &PendingCollective) {
        self.running_ops += 1;
        self.total_count += 1;
        self.total_volume += pending.byte_volume;
        if self.window_start.is_none() {
            self.window_start = Some(Instant::now());
        }
    }

    /// Records a completed collective; closes the busy span when none remain.
    pub fn complete(&mut self) {
        if self.running_ops == 0 {
            warn!("collective completion without a matching issue; ignoring");
            return;
        }
        self.running_ops -= 1;
        if self.running_ops == 0 {
            if let Some(start) = self.window_start.take() {
                self.total_time += start.elapsed().as_secs_f64();
            }
        }
    }

    /// Zeroes every counter and forgets any open span.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Collectives issued and not yet completed.
    #[must_use]
    pub fn running_ops(&self) -> usize {
        self.running_ops
    }

    /// Seconds spent inside closed busy spans.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Modelled bytes moved.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    /// Collectives issued.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Whether a busy span is open.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.window_start.is_some()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CommStats {
        CommStats {
            count: self.total_count,
            volume: self.total_volume,
            time: self.total_time,
        }
    }
}
