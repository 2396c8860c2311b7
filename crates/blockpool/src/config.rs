//! Block pool configuration

use crate::error::{PoolError, PoolResult};

/// Configuration for a block pool
///
/// `block_size` and `block_count` are required. Pages are pre-faulted by
/// default; the remaining fields are debugging aids and default to off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Requested size of each block in bytes
    pub block_size: usize,

    /// Number of blocks in the pool
    pub block_count: usize,

    /// Touch every page of the region at creation so first use never faults
    pub prefault: bool,

    /// Enable statistics tracking
    pub track_stats: bool,

    /// Keep a per-block allocated flag and reject double frees
    pub detect_double_free: bool,

    /// Fill pattern byte written to blocks when they are returned
    pub dealloc_pattern: Option<u8>,
}

impl PoolConfig {
    /// Configuration with only the required parameters set
    #[must_use]
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            block_size,
            block_count,
            prefault: true,
            track_stats: false,
            detect_double_free: false,
            dealloc_pattern: None,
        }
    }

    /// Debug configuration - every check and fill pattern enabled
    #[must_use]
    pub fn debug(block_size: usize, block_count: usize) -> Self {
        Self {
            track_stats: true,
            detect_double_free: true,
            dealloc_pattern: Some(0xDD),
            ..Self::new(block_size, block_count)
        }
    }

    /// Production configuration - statistics only
    #[must_use]
    pub fn production(block_size: usize, block_count: usize) -> Self {
        Self {
            track_stats: true,
            ..Self::new(block_size, block_count)
        }
    }

    /// Enable or disable pre-faulting of the backing region
    #[must_use = "builder methods must be chained or built"]
    pub fn with_prefault(mut self, enabled: bool) -> Self {
        self.prefault = enabled;
        self
    }

    /// Enable or disable statistics tracking
    #[must_use = "builder methods must be chained or built"]
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }

    /// Enable or disable double-free detection
    #[must_use = "builder methods must be chained or built"]
    pub fn with_double_free_detection(mut self, enabled: bool) -> Self {
        self.detect_double_free = enabled;
        self
    }

    /// Set the byte written over blocks on deallocation
    #[must_use = "builder methods must be chained or built"]
    pub fn with_dealloc_pattern(mut self, pattern: Option<u8>) -> Self {
        self.dealloc_pattern = pattern;
        self
    }

    /// Validate the required parameters
    pub fn validate(&self) -> PoolResult<()> {
        if self.block_size == 0 {
            return Err(PoolError::invalid_argument("block_size must be non-zero"));
        }
        if self.block_count == 0 {
            return Err(PoolError::invalid_argument("block_count must be non-zero"));
        }
        Ok(())
    }
}
