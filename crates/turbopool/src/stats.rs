//! Pool statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of a pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections counted against the ceiling (pending, idle or leased)
    pub size: usize,

    /// Established connections known to the pool
    pub live: usize,

    /// Connection attempts not yet resolved
    pub pending: usize,

    /// Entries offered for lease
    pub idle: usize,

    /// Total connection attempts started
    pub created: u64,

    /// Attempts that failed to establish
    pub establish_failures: u64,

    /// Successful leases
    pub leases: u64,

    /// Successful reverts
    pub reverts: u64,

    /// Connections closed by the sweeper
    pub evicted: u64,

    /// Leases refused at the ceiling
    pub capacity_rejections: u64,

    /// Whether `close` has run
    pub closed: bool,

    /// Whether `shutdown` has run
    pub shut_down: bool,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool[size:{},live:{},initial:{},idle:{}]",
            self.size, self.live, self.pending, self.idle
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) created: AtomicU64,
    pub(crate) establish_failures: AtomicU64,
    pub(crate) leases: AtomicU64,
    pub(crate) reverts: AtomicU64,
    pub(crate) evicted: AtomicU64,
    pub(crate) capacity_rejections: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut PoolStats) {
        stats.created = self.created.load(Ordering::Relaxed);
        stats.establish_failures = self.establish_failures.load(Ordering::Relaxed);
        stats.leases = self.leases.load(Ordering::Relaxed);
        stats.reverts = self.reverts.load(Ordering::Relaxed);
        stats.evicted = self.evicted.load(Ordering::Relaxed);
        stats.capacity_rejections = self.capacity_rejections.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_display() {
        let stats = PoolStats {
            size: 3,
            live: 2,
            pending: 1,
            idle: 1,
            ..Default::default()
        };
        assert_eq!(stats.to_string(), "Pool[size:3,live:2,initial:1,idle:1]");
    }

    #[test]
    fn test_counters_fill() {
        let counters = Counters::default();
        Counters::bump(&counters.leases);
        Counters::bump(&counters.leases);
        Counters::bump(&counters.evicted);

        let mut stats = PoolStats::default();
        counters.fill(&mut stats);
        assert_eq!(stats.leases, 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.created, 0);
    }
}
