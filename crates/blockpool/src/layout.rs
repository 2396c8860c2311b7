//! Block size normalization and alignment math

/// Width of a pointer on the target platform, the minimum block size.
pub const POINTER_WIDTH: usize = size_of::<*mut u8>();

/// Outcome of normalizing a requested block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSize {
    /// Size the caller asked for
    pub requested: usize,
    /// Size actually in effect
    pub effective: usize,
}

impl BlockSize {
    /// Raises `requested` to the pointer width and rounds it up to a multiple
    /// of the pointer width.
    ///
    /// Returns `None` if rounding overflows `usize`. A zero request is
    /// rejected earlier by config validation.
    #[must_use]
    pub fn normalize(requested: usize) -> Option<Self> {
        let raised = requested.max(POINTER_WIDTH);
        let effective = align_up(raised, POINTER_WIDTH)?;
        Some(Self {
            requested,
            effective,
        })
    }

    /// Whether normalization changed the requested size.
    #[must_use]
    pub fn was_adjusted(&self) -> bool {
        self.requested != self.effective
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
#[must_use]
pub fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Alignment every block start is guaranteed to have.
///
/// The region base is page aligned and blocks sit at multiples of
/// `block_size`, so the guarantee is the largest power of two dividing
/// `block_size`, capped at the page size.
#[must_use]
pub fn block_alignment(block_size: usize, page_size: usize) -> usize {
    debug_assert!(block_size > 0);
    let lowest_bit = block_size & block_size.wrapping_neg();
    lowest_bit.min(page_size)
}
