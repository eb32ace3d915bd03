//! Collection statistics.
//!
//! Tracks pass counts, reclamation totals, and pause times for
//! monitoring and tuning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics about collection activity on the process-wide graph.
#[derive(Debug)]
pub struct GcStats {
    /// Completed collection passes.
    pub collections: AtomicU64,
    /// Objects transferred into garbage bundles since start.
    pub objects_reclaimed: AtomicU64,
    /// Total time spent inside collection passes (nanoseconds).
    pub collect_time_ns: AtomicU64,
    /// Collection attempts rejected because a pass was in flight.
    pub rejected_collections: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            collections: AtomicU64::new(0),
            objects_reclaimed: AtomicU64::new(0),
            collect_time_ns: AtomicU64::new(0),
            rejected_collections: AtomicU64::new(0),
        }
    }

    /// Record a completed collection pass.
    pub(crate) fn record_collection(&self, duration: Duration, reclaimed: usize) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        self.objects_reclaimed
            .fetch_add(reclaimed as u64, Ordering::Relaxed);
        self.collect_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a rejected concurrent collection attempt.
    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.rejected_collections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total time spent collecting.
    pub fn total_collect_time(&self) -> Duration {
        Duration::from_nanos(self.collect_time_ns.load(Ordering::Relaxed))
    }

    /// Get the average collection pause time.
    pub fn avg_pause(&self) -> Duration {
        let count = self.collections.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.collect_time_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / count)
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.collections.store(0, Ordering::Relaxed);
        self.objects_reclaimed.store(0, Ordering::Relaxed);
        self.collect_time_ns.store(0, Ordering::Relaxed);
        self.rejected_collections.store(0, Ordering::Relaxed);
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}
