//! Statistics for the topic broker

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Global broker statistics
///
/// Counters only move on the cold paths (node creation/destruction and
/// handle attach/detach); the hot publish/copy paths are not instrumented
/// here.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Total topic nodes created
    pub nodes_created: AtomicUsize,
    /// Total topic nodes destroyed
    pub nodes_destroyed: AtomicUsize,
    /// Total advertisements handed out
    pub advertisements: AtomicUsize,
    /// Total subscriptions handed out
    pub subscriptions: AtomicUsize,
}

impl BrokerStats {
    /// Create new statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes (created minus destroyed)
    pub fn live_nodes(&self) -> usize {
        let created = self.nodes_created.load(Ordering::Relaxed);
        let destroyed = self.nodes_destroyed.load(Ordering::Relaxed);
        created.saturating_sub(destroyed)
    }

    /// Capture a point-in-time copy of all counters
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_destroyed: self.nodes_destroyed.load(Ordering::Relaxed),
            advertisements: self.advertisements.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BrokerStats`], suitable for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStatsSnapshot {
    pub nodes_created: usize,
    pub nodes_destroyed: usize,
    pub advertisements: usize,
    pub subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_nodes() {
        let stats = BrokerStats::new();
        assert_eq!(stats.live_nodes(), 0);

        stats.nodes_created.fetch_add(3, Ordering::Relaxed);
        stats.nodes_destroyed.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.live_nodes(), 2);
    }

    #[test]
    fn test_snapshot_copies_counters() {
        let stats = BrokerStats::new();
        stats.advertisements.fetch_add(2, Ordering::Relaxed);
        stats.subscriptions.fetch_add(5, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.advertisements, 2);
        assert_eq!(snapshot.subscriptions, 5);
        assert_eq!(snapshot.nodes_created, 0);
    }
}
