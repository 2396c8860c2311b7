//! Fixed-size block pool
//!
//! # Memory Layout
//! ```text
//! base                                                  base + block_size * block_count
//!  │                                                                 │
//!  [Block0][Block1][Block2][Block3] ... [BlockN-1]
//!     ↑               ↑
//!   used            used          free list (side table): 3 → 1 → ... → NIL
//! ```
//!
//! A single `parking_lot::Mutex` guards the free-list head and the used
//! counter. Every allocate and deallocate holds it for O(1) work only; logging
//! and statistics happen after it is released.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

use crate::backing::BackingStore;
use crate::block::Block;
use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::free_list::FreeList;
use crate::layout::{BlockSize, block_alignment};
use crate::stats::{PoolCounters, PoolStats};

/// Process-unique identifier of a [`BlockPool`]
///
/// Recorded in every [`Block`] and [`PoolBox`](crate::PoolBox) so a block can
/// never be returned to a pool that did not issue it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool-{}", self.0)
    }
}

/// State protected by the pool guard
struct PoolState {
    free: FreeList,
    used: usize,
    /// Per-block allocated flags, present when double-free detection is on
    live: Option<Box<[bool]>>,
}

impl PoolState {
    /// Pops a free block, returning its index and the new used count
    #[inline]
    fn take(&mut self) -> Option<(usize, usize)> {
        let index = self.free.pop()?;
        self.used += 1;
        if let Some(live) = self.live.as_deref_mut() {
            live[index] = true;
        }
        Some((index, self.used))
    }

    /// Clears the allocated flag for `index`
    ///
    /// Returns `false` when the block cannot currently be allocated: the pool
    /// has nothing outstanding, or the tracked flag says it is already free.
    #[inline]
    fn mark_free(&mut self, index: usize) -> bool {
        if self.used == 0 {
            return false;
        }
        if let Some(live) = self.live.as_deref_mut() {
            if !live[index] {
                return false;
            }
            live[index] = false;
        }
        true
    }

    #[inline]
    fn put(&mut self, index: usize) -> usize {
        self.free.push(index);
        self.used -= 1;
        self.used
    }

    fn rebuild(&mut self) {
        self.free.rebuild();
        self.used = 0;
        if let Some(live) = self.live.as_deref_mut() {
            live.fill(false);
        }
    }
}

/// Pool allocator for fixed-size blocks
///
/// The pool reserves `block_size * block_count` bytes once, up front, and
/// hands out blocks in O(1) without touching the global allocator. All
/// allocations have the same size; the block size is raised to at least the
/// pointer width and rounded to a multiple of it.
///
/// Allocation and deallocation take `&self` and may run concurrently from any
/// number of threads. [`reset`](Self::reset) takes `&mut self`, so it can
/// only run once every [`Block`] and [`PoolBox`](crate::PoolBox) is gone.
///
/// # Example
///
/// ```
/// use blockpool::{BlockPool, PoolError};
///
/// let pool = BlockPool::new(64, 2)?;
/// let a = pool.allocate()?;
/// let b = pool.allocate()?;
/// assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted { .. })));
///
/// pool.deallocate(a)?;
/// pool.deallocate(b)?;
/// assert_eq!(pool.blocks_used(), 0);
/// # Ok::<(), PoolError>(())
/// ```
pub struct BlockPool {
    /// Reserved region holding every block
    store: BackingStore,

    /// Free list and used counter
    state: Mutex<PoolState>,

    /// Requested and effective block size
    block_size: BlockSize,

    /// Alignment every block start is guaranteed to have
    block_align: usize,

    block_count: usize,

    id: PoolId,

    config: PoolConfig,

    /// Statistics, only updated when `config.track_stats` is set
    counters: PoolCounters,
}

impl BlockPool {
    /// Creates a pool of `block_count` blocks of at least `block_size` bytes
    ///
    /// # Errors
    /// - `InvalidArgument` if either parameter is zero
    /// - `OutOfMemory` if the region cannot be reserved
    pub fn new(block_size: usize, block_count: usize) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(block_size, block_count))
    }

    /// Creates a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;

        let block_size = BlockSize::normalize(config.block_size)
            .ok_or_else(|| PoolError::out_of_memory(usize::MAX, "block_size rounding overflows"))?;

        #[cfg(feature = "logging")]
        if block_size.was_adjusted() {
            warn!(
                requested = block_size.requested,
                effective = block_size.effective,
                "Block size adjusted to a multiple of the pointer width"
            );
        }

        let store = BackingStore::reserve(block_size.effective, config.block_count, config.prefault)?;
        let block_align = block_alignment(block_size.effective, region::page::size());

        let live = config
            .detect_double_free
            .then(|| vec![false; config.block_count].into_boxed_slice());

        let pool = Self {
            store,
            state: Mutex::new(PoolState {
                free: FreeList::new(config.block_count),
                used: 0,
                live,
            }),
            block_size,
            block_align,
            block_count: config.block_count,
            id: PoolId::next(),
            config,
            counters: PoolCounters::default(),
        };

        #[cfg(feature = "logging")]
        debug!(
            pool = %pool.id,
            block_size = pool.block_size.effective,
            block_count = pool.block_count,
            bytes = pool.store.len(),
            prefault = pool.config.prefault,
            "Block pool created"
        );

        Ok(pool)
    }

    /// Creates a pool sized and aligned for values of type `T`
    pub fn for_type<T>(block_count: usize) -> PoolResult<Self> {
        Self::new(size_of::<T>().max(align_of::<T>()), block_count)
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    /// Takes one block off the free list
    ///
    /// The block's contents are whatever its previous owner left there (zero
    /// for never-used blocks).
    ///
    /// # Errors
    /// `PoolExhausted` if every block is allocated. The pool never waits for
    /// a block to be returned.
    pub fn allocate(&self) -> PoolResult<Block<'_>> {
        let taken = self.state.lock().take();

        let Some((index, used)) = taken else {
            if self.config.track_stats {
                self.counters.record_failure();
            }
            return Err(PoolError::pool_exhausted(self.id, self.block_count));
        };

        if self.config.track_stats {
            self.counters.record_alloc(used);
        }

        #[cfg(feature = "logging")]
        trace!(pool = %self.id, index, used, "Block allocated");

        Ok(Block::new(
            self.store.block_ptr(index),
            index,
            self.block_size.effective,
            self.id,
        ))
    }

    /// Returns a block to the free list
    ///
    /// The freed block becomes the next one handed out.
    ///
    /// # Errors
    /// - `ForeignBlock` if another pool issued `block`
    /// - `DoubleFree` if the pool has no outstanding blocks
    pub fn deallocate(&self, block: Block<'_>) -> PoolResult<()> {
        if block.pool_id() != self.id {
            return Err(PoolError::foreign_block(self.id, block.address()));
        }
        self.release_index(block.index())
    }

    /// Returns a block by raw pointer
    ///
    /// # Errors
    /// - `NullPointer` if `ptr` is null
    /// - `ForeignBlock` if `ptr` is not the start of a block of this pool
    /// - `DoubleFree` if the block is detectably free already
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Block::into_raw`] on a block of this pool, must
    /// not have been returned since, and no one may access the block after
    /// this call. Double frees are only detected with
    /// [`PoolConfig::detect_double_free`]; otherwise they leave the block on
    /// the free list twice and it will be handed out to two owners.
    pub unsafe fn deallocate_raw(&self, ptr: *mut u8) -> PoolResult<()> {
        let ptr = NonNull::new(ptr).ok_or(PoolError::NullPointer)?;
        let address = ptr.as_ptr() as usize;
        let index = self
            .store
            .index_of(address)
            .ok_or_else(|| PoolError::foreign_block(self.id, address))?;
        self.release_index(index)
    }

    /// Pushes `index` back on the free list
    pub(crate) fn release_index(&self, index: usize) -> PoolResult<()> {
        let used = {
            let mut state = self.state.lock();
            if !state.mark_free(index) {
                drop(state);
                return Err(PoolError::double_free(self.id, index));
            }
            if let Some(pattern) = self.config.dealloc_pattern {
                // SAFETY: the block passed the ownership checks above and is
                // not on the free list yet, so nobody else can reach it while
                // the guard is held.
                unsafe { self.store.fill(index, pattern) };
            }
            state.put(index)
        };

        if self.config.track_stats {
            self.counters.record_dealloc();
        }

        #[cfg(feature = "logging")]
        trace!(pool = %self.id, index, used, "Block deallocated");
        #[cfg(not(feature = "logging"))]
        let _ = used;

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Marks every block free again
    ///
    /// Taking `&mut self` guarantees no [`Block`] or
    /// [`PoolBox`](crate::PoolBox) is alive. Pointers obtained through
    /// [`Block::into_raw`] become dangling claims and must not be used or
    /// returned. Values still living in such blocks are not dropped.
    pub fn reset(&mut self) {
        let state = self.state.get_mut();
        #[cfg(feature = "logging")]
        let discarded = state.used;

        state.rebuild();
        debug_assert_eq!(state.free.iter().count(), self.block_count);
        self.counters.clear();

        #[cfg(feature = "logging")]
        debug!(pool = %self.id, discarded, "Block pool reset");
    }

    /// Destroys the pool and returns its region to the OS
    ///
    /// Equivalent to dropping the pool.
    pub fn release(self) {
        drop(self);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Identifier recorded in every block issued by this pool
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Effective size of each block
    pub fn block_size(&self) -> usize {
        self.block_size.effective
    }

    /// Block size the pool was configured with, before adjustment
    pub fn requested_block_size(&self) -> usize {
        self.block_size.requested
    }

    /// Alignment every block start is guaranteed to have
    pub fn block_align(&self) -> usize {
        self.block_align
    }

    /// Total number of blocks
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Total usable bytes
    pub fn capacity(&self) -> usize {
        self.store.len()
    }

    /// Number of allocated blocks
    pub fn blocks_used(&self) -> usize {
        self.state.lock().used
    }

    /// Number of blocks on the free list
    pub fn blocks_free(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Checks if every block is allocated
    pub fn is_exhausted(&self) -> bool {
        self.state.lock().free.is_empty()
    }

    /// Checks if no block is allocated
    pub fn is_empty(&self) -> bool {
        self.blocks_used() == 0
    }

    /// Checks if a pointer lies inside this pool's region
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.store.contains(ptr as usize)
    }

    /// Configuration the pool was built from
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get statistics (if tracking is enabled)
    pub fn stats(&self) -> Option<PoolStats> {
        if !self.config.track_stats {
            return None;
        }
        Some(self.counters.snapshot(
            self.blocks_used(),
            self.block_size.effective,
            self.block_count,
        ))
    }

    #[cfg(test)]
    pub(crate) fn free_indices(&self) -> Vec<usize> {
        self.state.lock().free.iter().collect()
    }
}

impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("id", &self.id)
            .field("block_size", &self.block_size.effective)
            .field("block_count", &self.block_count)
            .field("blocks_used", &self.blocks_used())
            .finish_non_exhaustive()
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        {
            let outstanding = self.state.get_mut().used;
            debug!(pool = %self.id, outstanding, "Block pool released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::POINTER_WIDTH;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_parameters_fail() {
        assert!(matches!(
            BlockPool::new(0, 8),
            Err(PoolError::InvalidArgument { .. })
        ));
        assert!(matches!(
            BlockPool::new(64, 0),
            Err(PoolError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn block_size_is_normalized() {
        let pool = BlockPool::new(1, 4).unwrap();
        assert_eq!(pool.block_size(), POINTER_WIDTH);
        assert_eq!(pool.requested_block_size(), 1);

        let pool = BlockPool::new(POINTER_WIDTH + 1, 4).unwrap();
        assert_eq!(pool.block_size(), 2 * POINTER_WIDTH);
        assert_eq!(pool.capacity(), 8 * POINTER_WIDTH);
    }

    #[test]
    fn prefault_can_be_disabled() {
        for prefault in [true, false] {
            let config = PoolConfig::new(4096, 8).with_prefault(prefault);
            let pool = BlockPool::with_config(config).unwrap();
            let blocks: Vec<_> = (0..8).map(|_| pool.allocate().unwrap()).collect();
            for block in &blocks {
                let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), block.len()) };
                assert!(bytes.iter().all(|&b| b == 0));
            }
            for block in blocks {
                pool.deallocate(block).unwrap();
            }
        }
    }

    #[test]
    fn fresh_free_list_is_complete() {
        let pool = BlockPool::new(64, 16).unwrap();
        let mut indices = pool.free_indices();
        indices.sort_unstable();
        assert_eq!(indices, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn blocks_are_distinct_and_in_bounds() {
        let pool = BlockPool::new(48, 8).unwrap();
        let blocks: Vec<_> = (0..8).map(|_| pool.allocate().unwrap()).collect();

        let mut addresses: Vec<_> = blocks.iter().map(|b| b.as_ptr() as usize).collect();
        addresses.sort_unstable();
        addresses.dedup();
        assert_eq!(addresses.len(), 8);

        for block in &blocks {
            assert!(pool.contains(block.as_ptr()));
            assert_eq!(block.as_ptr() as usize % pool.block_align(), 0);
            assert_eq!(block.len(), 48);
        }
        for block in blocks {
            pool.deallocate(block).unwrap();
        }
    }

    #[test]
    fn counters_stay_consistent() {
        let pool = BlockPool::new(16, 4).unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(pool.blocks_used() + pool.free_indices().len(), 4);

        pool.deallocate(a).unwrap();
        assert_eq!(pool.blocks_used(), 1);
        assert_eq!(pool.blocks_free(), 3);
        pool.deallocate(b).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn foreign_block_is_rejected() {
        let pool_a = BlockPool::new(32, 2).unwrap();
        let pool_b = BlockPool::new(32, 2).unwrap();

        let block = pool_a.allocate().unwrap();
        let err = pool_b.deallocate(block).unwrap_err();
        assert!(matches!(err, PoolError::ForeignBlock { .. }));
        assert_eq!(pool_b.blocks_used(), 0);
        assert_eq!(pool_a.blocks_used(), 1);
    }

    #[test]
    fn raw_round_trip() {
        let pool = BlockPool::new(32, 2).unwrap();
        let ptr = pool.allocate().unwrap().into_raw();
        assert_eq!(pool.blocks_used(), 1);
        unsafe { pool.deallocate_raw(ptr.as_ptr()) }.unwrap();
        assert_eq!(pool.blocks_used(), 0);
    }

    #[test]
    fn raw_null_pointer_fails() {
        let pool = BlockPool::new(32, 2).unwrap();
        let err = unsafe { pool.deallocate_raw(core::ptr::null_mut()) }.unwrap_err();
        assert_eq!(err, PoolError::NullPointer);
    }

    #[test]
    fn raw_misaligned_pointer_is_foreign() {
        let pool = BlockPool::new(32, 2).unwrap();
        let block = pool.allocate().unwrap();
        let inner = block.as_ptr().wrapping_add(1);
        let err = unsafe { pool.deallocate_raw(inner) }.unwrap_err();
        assert!(matches!(err, PoolError::ForeignBlock { .. }));
        pool.deallocate(block).unwrap();
    }

    #[test]
    fn deallocate_on_empty_pool_is_double_free() {
        let pool = BlockPool::new(32, 2).unwrap();
        let ptr = pool.allocate().unwrap().into_raw();
        unsafe { pool.deallocate_raw(ptr.as_ptr()) }.unwrap();
        let err = unsafe { pool.deallocate_raw(ptr.as_ptr()) }.unwrap_err();
        assert!(matches!(err, PoolError::DoubleFree { index: 0, .. }));
        assert_eq!(pool.blocks_free(), 2);
    }

    #[test]
    fn tracked_double_free_is_detected() {
        let pool = BlockPool::with_config(PoolConfig::new(32, 4).with_double_free_detection(true))
            .unwrap();
        let first = pool.allocate().unwrap().into_raw();
        let _second = pool.allocate().unwrap();

        unsafe { pool.deallocate_raw(first.as_ptr()) }.unwrap();
        let err = unsafe { pool.deallocate_raw(first.as_ptr()) }.unwrap_err();
        assert!(matches!(err, PoolError::DoubleFree { .. }));
        assert_eq!(pool.blocks_used(), 1);
        assert_eq!(pool.free_indices().len(), 3);
    }

    #[test]
    fn dealloc_pattern_fills_block() {
        let pool = BlockPool::with_config(PoolConfig::new(16, 1).with_dealloc_pattern(Some(0xDD)))
            .unwrap();
        let block = pool.allocate().unwrap();
        let ptr = block.as_ptr();
        pool.deallocate(block).unwrap();

        let block = pool.allocate().unwrap();
        assert_eq!(block.as_ptr(), ptr);
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 16) };
        assert!(bytes.iter().all(|&b| b == 0xDD));
        pool.deallocate(block).unwrap();
    }

    #[test]
    fn reset_rebuilds_free_list() {
        let mut pool = BlockPool::new(64, 4).unwrap();
        for _ in 0..4 {
            let _ = pool.allocate().unwrap().into_raw();
        }
        assert!(pool.is_exhausted());

        pool.reset();
        assert_eq!(pool.blocks_used(), 0);
        assert_eq!(pool.free_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn stats_require_tracking() {
        let pool = BlockPool::new(16, 2).unwrap();
        assert!(pool.stats().is_none());

        let pool = BlockPool::with_config(PoolConfig::production(16, 2)).unwrap();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());
        pool.deallocate(a).unwrap();

        let stats = pool.stats().unwrap();
        assert_eq!(stats.total_allocs, 2);
        assert_eq!(stats.total_deallocs, 1);
        assert_eq!(stats.failed_allocs, 1);
        assert_eq!(stats.peak_used, 2);
        assert_eq!(stats.blocks_used, 1);
        pool.deallocate(b).unwrap();
    }

    #[test]
    fn pool_ids_are_unique() {
        let a = BlockPool::new(8, 1).unwrap();
        let b = BlockPool::new(8, 1).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("pool-"));
    }

    #[test]
    fn pool_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BlockPool>();
        assert_send_sync::<Block<'static>>();
    }
}
