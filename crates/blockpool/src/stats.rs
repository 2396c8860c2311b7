//! Block pool statistics

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics snapshot for a block pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful allocations since creation or the last reset
    pub total_allocs: u64,
    /// Successful deallocations since creation or the last reset
    pub total_deallocs: u64,
    /// Allocations that failed with exhaustion
    pub failed_allocs: u64,
    /// Highest `blocks_used` observed
    pub peak_used: usize,
    /// Blocks currently allocated
    pub blocks_used: usize,
    /// Effective size of each block
    pub block_size: usize,
    /// Total number of blocks
    pub block_count: usize,
}

impl PoolStats {
    /// Blocks currently free
    #[must_use]
    pub fn blocks_free(&self) -> usize {
        self.block_count - self.blocks_used
    }

    /// Fraction of blocks in use, `0.0..=1.0`
    #[must_use]
    pub fn utilization(&self) -> f64 {
        self.blocks_used as f64 / self.block_count as f64
    }
}

/// Relaxed counters updated outside the pool guard
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    allocs: AtomicU64,
    deallocs: AtomicU64,
    failed: AtomicU64,
    peak_used: AtomicUsize,
}

impl PoolCounters {
    #[inline]
    pub(crate) fn record_alloc(&self, used_after: usize) {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.peak_used.fetch_max(used_after, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dealloc(&self) {
        self.deallocs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn clear(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.deallocs.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.peak_used.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, blocks_used: usize, block_size: usize, block_count: usize) -> PoolStats {
        PoolStats {
            total_allocs: self.allocs.load(Ordering::Relaxed),
            total_deallocs: self.deallocs.load(Ordering::Relaxed),
            failed_allocs: self.failed.load(Ordering::Relaxed),
            peak_used: self.peak_used.load(Ordering::Relaxed),
            blocks_used,
            block_size,
            block_count,
        }
    }
}
