//! Report - Communication Statistics of a Window
//!
//! Ratios derived from measured times add [`EPSILON`] to their denominators:
//! a zero-length window is a valid measurement, not an error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Guard added to time denominators.
pub const EPSILON: f64 = 1e-12;

const MIB: f64 = 1024.0 * 1024.0;

/// Totals of one profiling window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CommStats {
    /// Collectives issued.
    pub count: usize,
    /// Modelled bytes moved.
    pub volume: f64,
    /// Busy seconds.
    pub time: f64,
}

impl CommStats {
    /// Average bandwidth in MiB/s over the busy time.
    #[must_use]
    pub fn bandwidth_mb_per_s(&self) -> f64 {
        (self.volume / MIB) / (self.time + EPSILON)
    }

    /// Share of `total_time` spent communicating, in percent.
    #[must_use]
    pub fn time_ratio(&self, total_time: f64) -> f64 {
        self.time * 100.0 / (total_time + EPSILON)
    }

    /// Volume in MiB.
    #[must_use]
    pub fn volume_mb(&self) -> f64 {
        self.volume / MIB
    }

    /// One-line summary relative to the wall time of the enclosing phase.
    #[must_use]
    pub fn summary(&self, total_time: f64) -> String {
        format!(
            "Communication time = {:.3} s, ratio = {:.3} %, avg bandwidth = {:.3} MB/s",
            self.time,
            self.time_ratio(total_time),
            self.bandwidth_mb_per_s()
        )
    }
}

impl fmt::Display for CommStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} collectives, {:.3} MB in {:.3} s ({:.3} MB/s)",
            self.count,
            self.volume_mb(),
            self.time,
            self.bandwidth_mb_per_s()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_time_is_finite() {
        let stats = CommStats {
            count: 1,
            volume: MIB,
            time: 0.0,
        };
        assert!(stats.bandwidth_mb_per_s().is_finite());
        assert!(stats.time_ratio(0.0).is_finite());
    }

    #[test]
    fn test_bandwidth_and_ratio() {
        let stats = CommStats {
            count: 3,
            volume: 2.0 * MIB,
            time: 0.5,
        };
        assert!((stats.bandwidth_mb_per_s() - 4.0).abs() < 1e-6);
        assert!((stats.time_ratio(2.0) - 25.0).abs() < 1e-6);
        assert!(stats.summary(2.0).contains("ratio = 25.000 %"));
    }

    #[test]
    fn test_serialize() {
        let stats = CommStats {
            count: 2,
            volume: 8.0,
            time: 0.25,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"count\":2"));
        let back: CommStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
