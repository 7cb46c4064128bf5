//! Volume Model - Bytes Moved per Collective
//!
//! Throughput model used to turn a collective call into a byte count. The
//! factors approximate the per-rank link traffic of the standard algorithms:
//! ring all-reduce moves `2(P-1)/P` of the payload (reduce-scatter phase plus
//! all-gather phase), all-gather and reduce-scatter move `(P-1)/P` of the
//! concatenated chunks, and rooted broadcast/reduce are charged one full
//! payload regardless of group size.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The profiled collective primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectiveKind {
    /// All-reduce.
    AllReduce,
    /// All-gather.
    AllGather,
    /// Reduce-scatter.
    ReduceScatter,
    /// Broadcast.
    Broadcast,
    /// Point-to-point reduce onto one rank.
    Reduce,
}

impl CollectiveKind {
    /// Returns the name of the primitive.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AllReduce => "all_reduce",
            Self::AllGather => "all_gather",
            Self::ReduceScatter => "reduce_scatter",
            Self::Broadcast => "broadcast",
            Self::Reduce => "reduce",
        }
    }
}

impl fmt::Display for CollectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `(P-1)/P`, zero for empty or single-rank groups.
fn correction(group_size: usize) -> f64 {
    if group_size == 0 {
        return 0.0;
    }
    let p = group_size as f64;
    (p - 1.0) / p
}

/// All-reduce volume: `2(P-1)/P * bytes`.
#[must_use]
pub fn all_reduce_volume(group_size: usize, bytes: usize) -> f64 {
    2.0 * correction(group_size) * bytes as f64
}

/// All-gather volume: `(P-1)/P * sum(chunk bytes)`.
#[must_use]
pub fn all_gather_volume(group_size: usize, chunk_bytes: &[usize]) -> f64 {
    correction(group_size) * chunk_bytes.iter().sum::<usize>() as f64
}

/// Reduce-scatter volume: `(P-1)/P * sum(chunk bytes)`.
#[must_use]
pub fn reduce_scatter_volume(group_size: usize, chunk_bytes: &[usize]) -> f64 {
    correction(group_size) * chunk_bytes.iter().sum::<usize>() as f64
}

/// Broadcast volume: the full payload.
#[must_use]
pub fn broadcast_volume(bytes: usize) -> f64 {
    bytes as f64
}

/// Reduce volume: the full payload.
#[must_use]
pub fn reduce_volume(bytes: usize) -> f64 {
    bytes as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_reduce_volume() {
        assert_eq!(all_reduce_volume(4, 4096), 6144.0);
        assert_eq!(all_reduce_volume(2, 100), 100.0);
        for p in 1..=16 {
            let expected = 2.0 * (p as f64 - 1.0) / p as f64 * 1000.0;
            assert!((all_reduce_volume(p, 1000) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gather_scatter_volume() {
        let chunks = [100, 200, 300, 400];
        assert_eq!(all_gather_volume(4, &chunks), 750.0);
        assert_eq!(reduce_scatter_volume(4, &chunks), 750.0);
    }

    #[test]
    fn test_rooted_volume_ignores_group_size() {
        assert_eq!(broadcast_volume(4096), 4096.0);
        assert_eq!(reduce_volume(4096), 4096.0);
    }

    #[test]
    fn test_single_rank_moves_nothing() {
        assert_eq!(all_reduce_volume(1, 4096), 0.0);
        assert_eq!(all_gather_volume(1, &[4096]), 0.0);
        assert_eq!(reduce_scatter_volume(1, &[4096]), 0.0);
        assert_eq!(all_reduce_volume(0, 4096), 0.0);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CollectiveKind::ReduceScatter.to_string(), "reduce_scatter");
        assert_eq!(CollectiveKind::AllReduce.name(), "all_reduce");
    }
}
