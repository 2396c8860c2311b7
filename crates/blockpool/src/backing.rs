//! Backing store: one contiguous OS reservation carved into blocks
//!
//! # Safety
//!
//! The region is reserved with `region::alloc` (anonymous, zero-filled,
//! read/write, never executable) and released exactly once when the
//! [`BackingStore`] drops. Block pointers are derived from the region base, so
//! they carry its provenance and stay valid for the store's lifetime.

use core::ptr::{self, NonNull};

use region::{Allocation, Protection};

use crate::error::{PoolError, PoolResult};

/// Contiguous memory region holding `block_count` blocks of `block_size` bytes
pub(crate) struct BackingStore {
    /// RAII guard over the mapping; unmapped on drop
    allocation: Allocation,

    /// First byte of the region
    base: NonNull<u8>,

    /// Usable bytes (`block_size * block_count`), excluding page rounding
    len: usize,

    block_size: usize,
    block_count: usize,
}

// SAFETY: BackingStore is Send because:
// - `Allocation` only holds the base address and size of a private mapping
// - The mapping is not tied to the creating thread
// - `base` points into that same mapping
unsafe impl Send for BackingStore {}

// SAFETY: BackingStore is Sync because:
// - No method hands out references into the region, only raw pointers
// - `fill` is the only writer; callers serialize it under the pool guard and
//   only call it on blocks that no one else holds
// - All other methods are pure address arithmetic
unsafe impl Sync for BackingStore {}

impl BackingStore {
    /// Reserves `block_size * block_count` bytes from the OS
    ///
    /// `block_size` must already be normalized (non-zero, pointer aligned).
    /// With `prefault` set, every page is touched before returning.
    ///
    /// # Errors
    /// Returns `OutOfMemory` if the total size overflows or the OS refuses
    /// the mapping.
    pub(crate) fn reserve(block_size: usize, block_count: usize, prefault: bool) -> PoolResult<Self> {
        debug_assert!(block_size > 0 && block_count > 0);

        let len = block_size
            .checked_mul(block_count)
            .ok_or_else(|| PoolError::out_of_memory(usize::MAX, "block_size * block_count overflows"))?;

        let mut allocation = region::alloc(len, Protection::READ_WRITE)
            .map_err(|e| PoolError::out_of_memory(len, e.to_string()))?;

        let base = NonNull::new(allocation.as_mut_ptr::<u8>())
            .ok_or_else(|| PoolError::out_of_memory(len, "mapping returned null"))?;

        let store = Self {
            allocation,
            base,
            len,
            block_size,
            block_count,
        };
        if prefault {
            store.prefault();
        }
        Ok(store)
    }

    /// Writes one byte per page so the OS backs the whole mapping now
    fn prefault(&self) {
        let page = region::page::size();
        let base = self.base.as_ptr();
        for offset in (0..self.allocation.len()).step_by(page) {
            // SAFETY: offset is inside the read/write mapping, which no block
            // handle can reach yet. Zero keeps the fresh-memory contents.
            unsafe { ptr::write_volatile(base.add(offset), 0) };
        }
    }

    /// Pointer to the first byte of block `index`
    #[inline]
    pub(crate) fn block_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.block_count);
        // SAFETY: index < block_count, so the offset stays inside the
        // `len`-byte region (len = block_size * block_count, checked above).
        unsafe { self.base.add(index * self.block_size) }
    }

    /// Maps an address back to its block index
    ///
    /// Returns `None` for addresses outside the region or not on a block
    /// boundary.
    #[inline]
    pub(crate) fn index_of(&self, address: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base_addr())?;
        if offset >= self.len || offset % self.block_size != 0 {
            return None;
        }
        Some(offset / self.block_size)
    }

    /// Checks whether `address` lies inside the usable region
    #[inline]
    pub(crate) fn contains(&self, address: usize) -> bool {
        address
            .checked_sub(self.base_addr())
            .is_some_and(|offset| offset < self.len)
    }

    /// Overwrites block `index` with `pattern`
    ///
    /// # Safety
    /// The block must be free or owned by the caller, and no other thread may
    /// touch it for the duration of the call.
    pub(crate) unsafe fn fill(&self, index: usize, pattern: u8) {
        // SAFETY: block_ptr(index) is valid for block_size bytes; exclusive
        // access is the caller's contract.
        unsafe { ptr::write_bytes(self.block_ptr(index).as_ptr(), pattern, self.block_size) };
    }

    #[inline]
    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Usable size in bytes
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Bytes actually mapped, including page rounding
    #[cfg(test)]
    pub(crate) fn mapped_len(&self) -> usize {
        self.allocation.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_is_zeroed_and_page_aligned() {
        let store = BackingStore::reserve(64, 8, false).unwrap();
        assert_eq!(store.len(), 512);
        assert!(store.mapped_len() >= 512);
        assert_eq!(store.base_addr() % region::page::size(), 0);

        for index in 0..8 {
            let ptr = store.block_ptr(index).as_ptr();
            // SAFETY: block is inside the mapping and unshared in this test.
            let bytes = unsafe { core::slice::from_raw_parts(ptr, 64) };
            assert!(bytes.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn prefaulted_store_reads_as_zero() {
        let page = region::page::size();
        let store = BackingStore::reserve(page / 2, 6, true).unwrap();
        assert_eq!(store.len(), page * 3);
        assert!(store.mapped_len() >= page * 3);

        for index in 0..6 {
            let ptr = store.block_ptr(index).as_ptr();
            // SAFETY: block is inside the mapping and unshared in this test.
            let bytes = unsafe { core::slice::from_raw_parts(ptr, page / 2) };
            assert!(bytes.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn index_round_trips_through_address() {
        let store = BackingStore::reserve(32, 4, false).unwrap();
        for index in 0..4 {
            let address = store.block_ptr(index).as_ptr() as usize;
            assert_eq!(store.index_of(address), Some(index));
        }
    }

    #[test]
    fn foreign_addresses_are_rejected() {
        let store = BackingStore::reserve(32, 4, false).unwrap();
        let base = store.base_addr();

        assert_eq!(store.index_of(base + 1), None);
        assert_eq!(store.index_of(base + 32 * 4), None);
        assert_eq!(store.index_of(base.wrapping_sub(32)), None);
        assert!(store.contains(base + 127));
        assert!(!store.contains(base + 128));
    }

    #[test]
    fn overflowing_size_is_out_of_memory() {
        let result = BackingStore::reserve(usize::MAX / 2 + 1, 2, true);
        assert!(matches!(result, Err(PoolError::OutOfMemory { .. })));
    }

    #[test]
    fn fill_writes_whole_block() {
        let store = BackingStore::reserve(16, 2, true).unwrap();
        // SAFETY: no other handle to the blocks exists in this test.
        unsafe { store.fill(1, 0xAB) };
        let ptr = store.block_ptr(1).as_ptr();
        let bytes = unsafe { core::slice::from_raw_parts(ptr, 16) };
        assert!(bytes.iter().all(|&b| b == 0xAB));
        assert_eq!(unsafe { *store.block_ptr(0).as_ptr() }, 0);
    }
}
