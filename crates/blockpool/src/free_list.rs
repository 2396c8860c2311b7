//! Index-based free list
//!
//! Free blocks are chained through a side table of `next` indices instead of
//! through the block memory itself:
//!
//! ```text
//! head ─► 3 ─► 0 ─► 1 ─► NIL        next: [1, NIL, _, 0]
//! ```
//!
//! Entries for allocated blocks are stale and never read. Pop and push are
//! O(1); rebuild is O(n).

/// Sentinel marking the end of the chain
const NIL: usize = usize::MAX;

/// Singly-linked chain of free block indices
#[derive(Debug)]
pub(crate) struct FreeList {
    next: Box<[usize]>,
    head: usize,
    len: usize,
}

impl FreeList {
    /// Creates a list with every index in `0..block_count` free
    pub(crate) fn new(block_count: usize) -> Self {
        let mut list = Self {
            next: vec![NIL; block_count].into_boxed_slice(),
            head: NIL,
            len: 0,
        };
        list.rebuild();
        list
    }

    /// Relinks every block, ascending, so pops start at index 0
    pub(crate) fn rebuild(&mut self) {
        let count = self.next.len();
        for (index, slot) in self.next.iter_mut().enumerate() {
            *slot = if index + 1 < count { index + 1 } else { NIL };
        }
        self.head = if count == 0 { NIL } else { 0 };
        self.len = count;
    }

    /// Detaches the head index
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let index = self.head;
        self.head = self.next[index];
        self.len -= 1;
        Some(index)
    }

    /// Attaches `index` as the new head
    ///
    /// Pushing an index that is already on the list corrupts the chain; the
    /// caller rules that out (or accepts it, for the unchecked contract).
    #[inline]
    pub(crate) fn push(&mut self, index: usize) {
        debug_assert!(index < self.next.len());
        self.next[index] = self.head;
        self.head = index;
        self.len += 1;
    }

    /// Number of free blocks
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Walks the chain from head to tail
    ///
    /// Stops after `capacity` steps so a corrupted (cyclic) chain still
    /// terminates.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let mut cursor = self.head;
        let mut remaining = self.next.len();
        core::iter::from_fn(move || {
            if cursor == NIL || remaining == 0 {
                return None;
            }
            remaining -= 1;
            let index = cursor;
            cursor = self.next[index];
            Some(index)
        })
    }
}
