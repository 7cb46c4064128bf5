//! Memory Tracker - Peak Buffer Usage per Epoch
//!
//! Byte accounting for the buffers a rank holds while it trains: model state
//! stays resident, activations and communication buffers come and go each
//! step. [`MemoryTracker::start`] re-bases the peak on what is resident at
//! that moment, so every window reports its own high-water mark.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// =============================================================================
// MemoryStats
// =============================================================================

/// Summary of one measurement window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Bytes resident when the window closed.
    pub current_usage: usize,
    /// Highest resident byte count inside the window.
    pub peak_usage: usize,
    /// Allocations recorded inside the window.
    pub allocation_count: usize,
    /// Deallocations recorded inside the window.
    pub deallocation_count: usize,
}

// =============================================================================
// MemoryTracker
// =============================================================================

/// Tracks resident bytes and their peak.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    current_usage: usize,
    peak_usage: usize,
    allocation_count: usize,
    deallocation_count: usize,
}

impl MemoryTracker {
    /// Creates a tracker with nothing resident.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a window: the peak restarts from the bytes resident now.
    pub fn start(&mut self) {
        self.peak_usage = self.current_usage;
        self.allocation_count = 0;
        self.deallocation_count = 0;
    }

    /// Closes the window and returns its statistics.
    pub fn stop(&mut self) -> MemoryStats {
        let stats = self.stats();
        debug!(
            peak = %Self::format_bytes(stats.peak_usage),
            allocations = stats.allocation_count,
            "memory tracker stopped"
        );
        stats
    }

    /// Records `bytes` becoming resident.
    pub fn record_alloc(&mut self, name: &str, bytes: usize) {
        self.current_usage += bytes;
        self.allocation_count += 1;
        if self.current_usage > self.peak_usage {
            self.peak_usage = self.current_usage;
        }
        trace!(buffer = name, bytes, current = self.current_usage, "alloc");
    }

    /// Records `bytes` being released.
    pub fn record_free(&mut self, name: &str, bytes: usize) {
        self.current_usage = self.current_usage.saturating_sub(bytes);
        self.deallocation_count += 1;
        trace!(buffer = name, bytes, current = self.current_usage, "free");
    }

    /// Resident bytes.
    #[must_use]
    pub fn current_usage(&self) -> usize {
        self.current_usage
    }

    /// Peak resident bytes of the current window.
    #[must_use]
    pub fn peak_usage(&self) -> usize {
        self.peak_usage
    }

    /// Statistics of the current window without closing it.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            current_usage: self.current_usage,
            peak_usage: self.peak_usage,
            allocation_count: self.allocation_count,
            deallocation_count: self.deallocation_count,
        }
    }

    /// Formats bytes into a human-readable string.
    #[must_use]
    pub fn format_bytes(bytes: usize) -> String {
        const KB: usize = 1024;
        const MB: usize = KB * 1024;
        const GB: usize = MB * 1024;

        if bytes >= GB {
            format!("{:.3} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.3} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.3} KB", bytes as f64 / KB as f64)
        } else {
            format!("{bytes} B")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
