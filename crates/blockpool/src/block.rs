//! Raw block handles

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::pool::{BlockPool, PoolId};

/// One allocated block of a [`BlockPool`]
///
/// A `Block` is the exclusive claim on `len()` bytes of the pool's backing
/// memory. It is deliberately not `Clone`: returning it through
/// [`BlockPool::deallocate`] consumes it, so a block cannot be freed twice
/// through this type. It borrows the pool, so it cannot outlive it or survive
/// a [`BlockPool::reset`].
///
/// Dropping a `Block` without deallocating it leaks the block until the next
/// reset. The contents are only reachable through raw pointers; the pool never
/// runs constructors or destructors on them.
#[must_use = "dropping a block leaks it until the pool is reset"]
pub struct Block<'pool> {
    ptr: NonNull<u8>,
    index: usize,
    len: usize,
    pool_id: PoolId,
    _pool: PhantomData<&'pool BlockPool>,
}

// SAFETY: Block is Send because:
// - It is a unique claim on a block; no other handle aliases it
// - The backing mapping is not thread-bound
unsafe impl Send for Block<'_> {}

// SAFETY: Block is Sync because shared access only exposes the pointer value,
// never the bytes behind it.
unsafe impl Sync for Block<'_> {}

impl<'pool> Block<'pool> {
    pub(crate) fn new(ptr: NonNull<u8>, index: usize, len: usize, pool_id: PoolId) -> Self {
        Self {
            ptr,
            index,
            len,
            pool_id,
            _pool: PhantomData,
        }
    }

    /// Raw pointer to the first byte of the block
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Non-null pointer to the first byte of the block
    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Position of the block inside the pool
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Usable bytes (the pool's effective block size)
    #[inline]
    #[allow(clippy::len_without_is_empty)] // blocks are never empty
    pub fn len(&self) -> usize {
        self.len
    }

    /// Identifier of the pool that issued this block
    #[inline]
    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Gives up the handle and returns the raw pointer
    ///
    /// The block stays allocated. Hand it back with
    /// [`BlockPool::deallocate_raw`], or it is reclaimed by the next reset.
    #[must_use = "the block stays allocated; keep the pointer to free it"]
    pub fn into_raw(self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("pool", &self.pool_id)
            .field("index", &self.index)
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
