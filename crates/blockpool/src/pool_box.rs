//! Typed construction on top of raw blocks
//!
//! [`BlockPool::create`] places a value in one block and returns a
//! [`PoolBox`], which behaves like `Box<T>` but gives the block back to the
//! pool when dropped.

use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

#[cfg(feature = "logging")]
use tracing::debug;

use crate::block::Block;
use crate::error::{PoolError, PoolResult};
use crate::pool::{BlockPool, PoolId};

/// RAII smart pointer for a value living in a pool block
///
/// Dropping the box runs `T`'s destructor and returns the block.
pub struct PoolBox<'pool, T> {
    ptr: NonNull<T>,
    index: usize,
    pool: &'pool BlockPool,
    _owns: PhantomData<T>,
}

// SAFETY: PoolBox<T> is Send if T is Send.
// - It uniquely owns the T behind `ptr`
// - `&BlockPool` is Send because BlockPool is Sync
unsafe impl<T: Send> Send for PoolBox<'_, T> {}

// SAFETY: PoolBox<T> is Sync if T is Sync.
// - `&PoolBox<T>` only exposes `&T`
unsafe impl<T: Sync> Sync for PoolBox<'_, T> {}

impl<'pool, T> PoolBox<'pool, T> {
    /// Moves `value` into a block of `pool`
    pub fn new_in(value: T, pool: &'pool BlockPool) -> PoolResult<Self> {
        pool.create_with(value)
    }

    /// Pool that owns the block
    #[must_use]
    pub fn pool_id(&self) -> PoolId {
        self.pool.id()
    }

    /// Position of the block inside the pool
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw pointer to the value
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Consumes the box and returns the value, freeing the block
    #[must_use]
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        // SAFETY: `ptr` holds an initialized T that this box owns; the box is
        // never dropped, so the value is moved out exactly once.
        let value = unsafe { ptr::read(this.ptr.as_ptr()) };
        // A live box always owns its block, so the release cannot fail.
        let _ = this.pool.release_index(this.index);
        value
    }

    /// Drops the value and frees the block, reporting release errors
    pub fn destroy(self) -> PoolResult<()> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the value is initialized and owned by this box; the box is
        // never dropped, so the destructor runs exactly once.
        unsafe { ptr::drop_in_place(this.ptr.as_ptr()) };
        this.pool.release_index(this.index)
    }
}

impl<T> Deref for PoolBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` points to an initialized T owned by this box; the
        // borrow is tied to `&self`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for PoolBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `&mut self` guarantees exclusive access to the value.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T> Drop for PoolBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and dropped only here.
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        // A live box always owns its block, so the release cannot fail.
        let _ = self.pool.release_index(self.index);
    }
}

impl BlockPool {
    /// Allocates a block and constructs `T::default()` in it
    ///
    /// # Errors
    /// - `SizeExceedsBlock` if `T` is larger than a block
    /// - `AlignmentExceedsBlock` if `T` needs stricter alignment than blocks have
    /// - `PoolExhausted` if no block is free
    pub fn create<T: Default>(&self) -> PoolResult<PoolBox<'_, T>> {
        self.check_fits::<T>()?;
        let block = self.allocate()?;
        Ok(self.emplace(block, T::default()))
    }

    /// Allocates a block and moves `value` into it
    ///
    /// On error `value` is dropped.
    pub fn create_with<T>(&self, value: T) -> PoolResult<PoolBox<'_, T>> {
        self.check_fits::<T>()?;
        let block = self.allocate()?;
        Ok(self.emplace(block, value))
    }

    /// Drops the value in `handle` and returns its block
    ///
    /// # Errors
    /// `ForeignBlock` if another pool issued `handle`. The handle is still
    /// dropped and its block returned to the pool that issued it.
    pub fn destroy<T>(&self, handle: PoolBox<'_, T>) -> PoolResult<()> {
        if handle.pool_id() != self.id() {
            let address = handle.as_ptr() as usize;
            drop(handle);
            return Err(PoolError::foreign_block(self.id(), address));
        }

        #[cfg(feature = "logging")]
        debug!(
            pool = %self.id(),
            index = handle.index(),
            type_name = core::any::type_name::<T>(),
            "Destroying pooled value"
        );

        handle.destroy()
    }

    fn check_fits<T>(&self) -> PoolResult<()> {
        if size_of::<T>() > self.block_size() {
            return Err(PoolError::size_exceeds_block::<T>(self.block_size()));
        }
        if align_of::<T>() > self.block_align() {
            return Err(PoolError::alignment_exceeds_block::<T>(self.block_align()));
        }
        Ok(())
    }

    fn emplace<T>(&self, block: Block<'_>, value: T) -> PoolBox<'_, T> {
        let index = block.index();
        let typed = block.into_raw().cast::<T>();
        // SAFETY: the block is exclusively ours, at least size_of::<T>() bytes
        // long and aligned for T (check_fits); write does not drop the old
        // bytes.
        unsafe { typed.write(value) };
        PoolBox {
            ptr: typed,
            index,
            pool: self,
            _owns: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PoolConfig;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Default, PartialEq)]
    struct Record {
        id: u64,
        score: f32,
    }

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn create_default_constructs() {
        let pool = BlockPool::new(64, 2).unwrap();
        let record = pool.create::<Record>().unwrap();
        assert_eq!(*record, Record::default());
        assert_eq!(pool.blocks_used(), 1);
        drop(record);
        assert_eq!(pool.blocks_used(), 0);
    }

    #[test]
    fn create_with_moves_value_in() {
        let pool = BlockPool::new(64, 2).unwrap();
        let mut record = pool.create_with(Record { id: 7, score: 1.5 }).unwrap();
        record.id += 1;
        assert_eq!(record.id, 8);
        assert_eq!(record.into_inner(), Record { id: 8, score: 1.5 });
        assert_eq!(pool.blocks_used(), 0);
    }

    #[test]
    fn oversized_type_is_rejected() {
        let pool = BlockPool::new(16, 2).unwrap();
        let err = pool.create::<[u8; 17]>().unwrap_err();
        assert!(matches!(
            err,
            PoolError::SizeExceedsBlock {
                size: 17,
                block_size: 16,
                ..
            }
        ));
        assert_eq!(pool.blocks_used(), 0);
    }

    #[test]
    fn overaligned_type_is_rejected() {
        #[repr(align(64))]
        #[derive(Default)]
        struct Wide(u8);

        // 72 is only guaranteed 8-byte alignment
        let pool = BlockPool::new(72, 2).unwrap();
        assert!(matches!(
            pool.create::<Wide>(),
            Err(PoolError::AlignmentExceedsBlock { align: 64, .. })
        ));
    }

    #[test]
    fn exhaustion_propagates() {
        let pool = BlockPool::new(8, 1).unwrap();
        let _held = pool.create::<u64>().unwrap();
        assert!(matches!(
            pool.create::<u64>(),
            Err(PoolError::PoolExhausted { .. })
        ));
    }

    #[test]
    fn destroy_runs_destructor_once() {
        let drops = Rc::new(Cell::new(0));
        let pool = BlockPool::new(32, 2).unwrap();

        let value = pool.create_with(DropCounter(Rc::clone(&drops))).unwrap();
        pool.destroy(value).unwrap();
        assert_eq!(drops.get(), 1);
        assert_eq!(pool.blocks_used(), 0);

        let value = pool.create_with(DropCounter(Rc::clone(&drops))).unwrap();
        drop(value);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn destroy_through_wrong_pool() {
        let owner = BlockPool::new(32, 1).unwrap();
        let other = BlockPool::new(32, 1).unwrap();

        let value = owner.create_with(5_u32).unwrap();
        let err = other.destroy(value).unwrap_err();
        assert!(matches!(err, PoolError::ForeignBlock { .. }));
        assert_eq!(owner.blocks_used(), 0);
        assert_eq!(other.blocks_used(), 0);
    }

    #[test]
    fn value_lives_inside_the_pool() {
        let pool = BlockPool::with_config(PoolConfig::debug(32, 4)).unwrap();
        let value = PoolBox::new_in(String::from("pooled"), &pool).unwrap();
        assert!(pool.contains(value.as_ptr().cast()));
        assert_eq!(value.as_str(), "pooled");
    }
}
