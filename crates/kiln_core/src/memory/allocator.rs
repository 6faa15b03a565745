//! Allocator capability shared by every allocator variant.

use std::ptr::NonNull;

/// Bookkeeping embedded in every allocator variant.
///
/// For the pool allocator `total_size` is the size of one block, not the
/// sum over all blocks it has grown into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorState {
    pub total_size: usize,
    pub used: usize,
    pub base: Option<NonNull<u8>>,
}

impl AllocatorState {
    pub fn new(total_size: usize) -> Self {
        Self {
            total_size,
            used: 0,
            base: None,
        }
    }

    /// Return the bookkeeping to its quiescent state.
    ///
    /// Never touches memory: releasing the regions themselves is up to
    /// the variant that acquired them.
    pub fn release(&mut self) {
        self.total_size = 0;
        self.used = 0;
        self.base = None;
    }
}

/// Common contract for engine allocators.
///
/// Allocators are single-threaded; none of them are `Send` or `Sync`.
pub trait Allocator {
    /// Shared bookkeeping for this allocator.
    fn state(&self) -> &AllocatorState;

    /// Reserve `size` bytes.
    ///
    /// Returns `None` when the allocator is exhausted or cannot serve
    /// `size`. Never panics on ordinary exhaustion.
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Return memory to the allocator.
    ///
    /// Pointers this allocator does not own are ignored.
    ///
    /// # Safety
    /// If `ptr` lies inside memory owned by this allocator, it must have
    /// been returned by `allocate` on this allocator and not freed since.
    unsafe fn free(&mut self, ptr: NonNull<u8>);

    /// Whether `ptr` lies inside a region owned by this allocator.
    fn owns(&self, ptr: NonNull<u8>) -> bool;

    #[inline]
    fn total_capacity(&self) -> usize {
        self.state().total_size
    }

    #[inline]
    fn used(&self) -> usize {
        self.state().used
    }

    #[inline]
    fn available(&self) -> usize {
        self.total_capacity().saturating_sub(self.used())
    }
}

/// Bytes to add to `base_address` so the result is a multiple of `alignment`.
///
/// `alignment` must be a non-zero power of two. An already aligned address
/// needs no padding.
#[inline]
pub const fn calculate_padding(base_address: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    base_address.wrapping_neg() & (alignment - 1)
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    value + calculate_padding(value, alignment)
}
