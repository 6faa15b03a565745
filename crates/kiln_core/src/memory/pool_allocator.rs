// pool_allocator.rs - Fixed-size slot allocator with an intrusive free list
//
// Every block is carved into `slots_per_block` slots of `object_size` bytes.
// Unused slots hold a link to the next unused slot in their first bytes, so
// the free list costs no memory beyond the slots themselves.

use super::{AllocError, Allocator, AllocatorState};
use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

/// Bytes a free slot needs to store its link.
const LINK_SIZE: usize = mem::size_of::<*mut u8>();

/// Snapshot of a pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub object_size: usize,
    pub slots_per_block: usize,
    pub blocks: usize,
    pub used_bytes: usize,
    pub reserved_bytes: usize,
}

impl PoolStats {
    #[inline]
    pub fn live_objects(&self) -> usize {
        self.used_bytes / self.object_size
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.slots_per_block * self.blocks - self.live_objects()
    }
}

/// Allocator for many objects of one fixed size.
///
/// Starts with one block of `object_count` slots. The growing form
/// [`allocate_growing`](Self::allocate_growing) adds another block of the
/// same size whenever the free list runs dry; blocks never move, so issued
/// pointers stay valid until freed or until the pool is dropped.
///
/// Dropping the pool releases every block, including slots that are still
/// handed out. Owners must be done with all their objects first; nothing
/// checks this.
#[derive(Debug)]
pub struct PoolAllocator {
    state: AllocatorState,
    object_size: usize,
    slots_per_block: usize,
    block_layout: Layout,
    blocks: Vec<NonNull<u8>>,
    free_head: *mut u8,
}

impl PoolAllocator {
    /// Create a pool of `object_count` slots of `object_size` bytes each.
    ///
    /// Blocks are pointer-aligned. `object_size` must be able to hold a
    /// pointer and `object_count` must be non-zero.
    pub fn new(object_size: usize, object_count: usize) -> Result<Self, AllocError> {
        Self::build(object_size, object_count, mem::align_of::<*mut u8>())
    }

    /// Like [`new`](Self::new), but every slot is aligned to `align`.
    ///
    /// `object_size` must be a multiple of `align` so slots after the first
    /// keep the alignment.
    pub fn with_alignment(
        object_size: usize,
        object_count: usize,
        align: usize,
    ) -> Result<Self, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { align });
        }
        if object_size % align != 0 {
            return Err(AllocError::MisalignedObjectSize { object_size, align });
        }
        Self::build(object_size, object_count, align)
    }

    fn build(object_size: usize, object_count: usize, align: usize) -> Result<Self, AllocError> {
        if object_size < LINK_SIZE {
            return Err(AllocError::ObjectTooSmall {
                object_size,
                min: LINK_SIZE,
            });
        }
        if object_count == 0 {
            return Err(AllocError::ZeroObjectCount);
        }
        let block_layout = object_size
            .checked_mul(object_count)
            .and_then(|size| Layout::from_size_align(size, align).ok())
            .ok_or(AllocError::BlockTooLarge {
                object_size,
                object_count,
            })?;

        let mut pool = Self {
            state: AllocatorState::new(block_layout.size()),
            object_size,
            slots_per_block: block_layout.size() / object_size,
            block_layout,
            blocks: Vec::with_capacity(1),
            free_head: ptr::null_mut(),
        };
        let first = pool.acquire_block();
        pool.state.base = Some(first);

        tracing::debug!(
            object_size,
            slots_per_block = pool.slots_per_block,
            align,
            "pool allocator created"
        );
        Ok(pool)
    }

    /// Take a slot, growing the pool by one block if none are free.
    ///
    /// Only fails if the system allocator does, which aborts.
    pub fn allocate_growing(&mut self) -> NonNull<u8> {
        let slot = match NonNull::new(self.free_head) {
            Some(slot) => slot,
            None => self.grow(),
        };
        self.take(slot)
    }

    #[inline]
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    #[inline]
    pub fn slots_per_block(&self) -> usize {
        self.slots_per_block
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes acquired from the system across all blocks.
    #[inline]
    pub fn reserved_bytes(&self) -> usize {
        self.block_layout.size() * self.blocks.len()
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.stats().free_slots()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            object_size: self.object_size,
            slots_per_block: self.slots_per_block,
            blocks: self.blocks.len(),
            used_bytes: self.state.used,
            reserved_bytes: self.reserved_bytes(),
        }
    }

    /// Pop `slot`, which must be the current free-list head.
    #[inline]
    fn take(&mut self, slot: NonNull<u8>) -> NonNull<u8> {
        debug_assert_eq!(slot.as_ptr(), self.free_head);
        // SAFETY: free slots always start with a link written by
        // `thread_free_list` or `free`.
        self.free_head = unsafe { ptr::read_unaligned(slot.as_ptr() as *const *mut u8) };
        self.state.used += self.object_size;
        tracing::trace!(slot = ?slot, used = self.state.used, "pool slot allocated");
        slot
    }

    /// Add one block sized like the first and make it the free list.
    fn grow(&mut self) -> NonNull<u8> {
        debug_assert!(self.free_head.is_null(), "grow with free slots left");
        let block = self.acquire_block();
        tracing::debug!(
            object_size = self.object_size,
            slots_per_block = self.slots_per_block,
            blocks = self.blocks.len(),
            "pool allocator grew"
        );
        block
    }

    /// Allocate a block from the system, link its slots and make it the
    /// free-list head.
    fn acquire_block(&mut self) -> NonNull<u8> {
        // SAFETY: the layout size is at least LINK_SIZE.
        let raw = unsafe { alloc::alloc(self.block_layout) };
        let block = match NonNull::new(raw) {
            Some(block) => block,
            None => alloc::handle_alloc_error(self.block_layout),
        };
        // SAFETY: `block` spans `slots_per_block * object_size` fresh bytes.
        unsafe { self.thread_free_list(block) };
        self.blocks.push(block);
        block
    }

    /// Link every slot of `block` in ascending address order, ending in null.
    ///
    /// # Safety
    /// `block` must point to `slots_per_block * object_size` writable bytes.
    unsafe fn thread_free_list(&mut self, block: NonNull<u8>) {
        let base = block.as_ptr();
        for i in 0..self.slots_per_block {
            let slot = base.add(i * self.object_size);
            let next = if i + 1 < self.slots_per_block {
                base.add((i + 1) * self.object_size)
            } else {
                ptr::null_mut()
            };
            ptr::write_unaligned(slot as *mut *mut u8, next);
        }
        self.free_head = base;
    }

    /// Offset of `ptr` inside whichever owned block contains it.
    fn block_offset(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let block_size = self.block_layout.size();
        self.blocks.iter().find_map(|block| {
            let base = block.as_ptr() as usize;
            (addr >= base && addr - base < block_size).then(|| addr - base)
        })
    }

    #[cfg(test)]
    fn free_list_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.free_head;
        while !cursor.is_null() {
            len += 1;
            cursor = unsafe { ptr::read_unaligned(cursor as *const *mut u8) };
        }
        len
    }
}

impl Allocator for PoolAllocator {
    #[inline]
    fn state(&self) -> &AllocatorState {
        &self.state
    }

    /// Take a slot without growing. `size` must equal the object size.
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        debug_assert_eq!(
            size, self.object_size,
            "pool serves {}-byte objects only",
            self.object_size
        );
        if size != self.object_size {
            return None;
        }
        let slot = NonNull::new(self.free_head)?;
        Some(self.take(slot))
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let Some(offset) = self.block_offset(ptr) else {
            tracing::warn!(ptr = ?ptr, "ignoring free of pointer not owned by pool");
            return;
        };
        if offset % self.object_size != 0 {
            tracing::warn!(ptr = ?ptr, offset, "ignoring free of pointer inside a slot");
            return;
        }
        debug_assert!(self.state.used >= self.object_size, "more frees than allocations");

        ptr::write_unaligned(ptr.as_ptr() as *mut *mut u8, self.free_head);
        self.free_head = ptr.as_ptr();
        self.state.used = self.state.used.saturating_sub(self.object_size);
        tracing::trace!(slot = ?ptr, used = self.state.used, "pool slot freed");
    }

    #[inline]
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.block_offset(ptr).is_some()
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            // SAFETY: every block was allocated with `block_layout` and is
            // released exactly once here.
            unsafe { alloc::dealloc(block.as_ptr(), self.block_layout) };
        }
        self.free_head = ptr::null_mut();
        self.state.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fill(pool: &mut PoolAllocator, n: usize) -> Vec<NonNull<u8>> {
        (0..n).map(|_| pool.allocate_growing()).collect()
    }

    #[test]
    fn construction_threads_one_block() {
        let pool = PoolAllocator::new(16, 4).unwrap();
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.total_capacity(), 64);
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.free_list_len(), 4);
        assert_eq!(pool.state().base.map(|b| b.as_ptr()), Some(pool.free_head));
    }

    #[test]
    fn rejects_objects_smaller_than_a_link() {
        let err = PoolAllocator::new(LINK_SIZE - 1, 8).unwrap_err();
        assert_eq!(
            err,
            AllocError::ObjectTooSmall {
                object_size: LINK_SIZE - 1,
                min: LINK_SIZE
            }
        );
    }

    #[test]
    fn rejects_empty_blocks_and_bad_layouts() {
        assert_eq!(PoolAllocator::new(16, 0).unwrap_err(), AllocError::ZeroObjectCount);
        assert_eq!(
            PoolAllocator::new(usize::MAX / 2, 4).unwrap_err(),
            AllocError::BlockTooLarge {
                object_size: usize::MAX / 2,
                object_count: 4
            }
        );
        assert_eq!(
            PoolAllocator::with_alignment(32, 4, 24).unwrap_err(),
            AllocError::InvalidAlignment { align: 24 }
        );
        assert_eq!(
            PoolAllocator::with_alignment(24, 4, 16).unwrap_err(),
            AllocError::MisalignedObjectSize {
                object_size: 24,
                align: 16
            }
        );
    }

    #[test]
    fn first_block_serves_exactly_n_distinct_slots() {
        let mut pool = PoolAllocator::new(24, 8).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..8 {
            let ptr = pool.allocate(24).expect("slot available");
            assert!(seen.insert(ptr));
        }
        assert_eq!(pool.allocate(24), None);
        assert_eq!(pool.block_count(), 1);
    }

    #[test]
    fn slots_are_handed_out_in_ascending_order() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let addrs: Vec<usize> = fill(&mut pool, 4).iter().map(|p| p.as_ptr() as usize).collect();
        for pair in addrs.windows(2) {
            assert_eq!(pair[1] - pair[0], 16);
        }
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let p = pool.allocate_growing();
        unsafe { pool.free(p) };
        assert_eq!(pool.allocate_growing(), p);

        let a = pool.allocate_growing();
        let b = pool.allocate_growing();
        unsafe {
            pool.free(a);
            pool.free(b);
        }
        assert_eq!(pool.allocate_growing(), b);
        assert_eq!(pool.allocate_growing(), a);
    }

    #[test]
    fn fixed_size_allocate_never_grows() {
        let mut pool = PoolAllocator::new(16, 2).unwrap();
        assert!(pool.allocate(16).is_some());
        assert!(pool.allocate(16).is_some());

        assert_eq!(pool.allocate(16), None);
        assert_eq!(pool.block_count(), 1);
        assert_eq!(pool.used(), 32);
    }

    #[test]
    fn growth_adds_one_block_of_the_original_size() {
        let mut pool = PoolAllocator::new(32, 3).unwrap();
        let mut issued: HashSet<_> = fill(&mut pool, 3).into_iter().collect();
        assert_eq!(pool.block_count(), 1);

        let grown = pool.allocate_growing();
        assert!(issued.insert(grown));
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.reserved_bytes(), 2 * 96);
        assert_eq!(pool.total_capacity(), 96);

        for _ in 0..2 {
            assert!(issued.insert(pool.allocate_growing()));
        }
        assert_eq!(pool.block_count(), 2);

        assert!(issued.insert(pool.allocate_growing()));
        assert_eq!(pool.block_count(), 3);
        assert_eq!(pool.slots_per_block(), 3);
    }

    #[test]
    fn used_bytes_track_allocations_minus_frees() {
        let mut pool = PoolAllocator::new(16, 2).unwrap();
        let mut live = Vec::new();
        for step in 0..20 {
            if step % 3 == 2 {
                let ptr = live.remove(0);
                unsafe { pool.free(ptr) };
            } else {
                live.push(pool.allocate_growing());
            }
            assert_eq!(pool.used(), 16 * live.len());
            assert_eq!(pool.used() % pool.object_size(), 0);
            assert_eq!(pool.free_slots(), pool.free_list_len());
        }
    }

    #[test]
    fn foreign_pointer_free_is_ignored() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let _held = pool.allocate_growing();
        let head = pool.free_head;

        let mut on_stack = [0u64; 2];
        unsafe { pool.free(NonNull::from(&mut on_stack).cast::<u8>()) };

        assert_eq!(pool.used(), 16);
        assert_eq!(pool.free_head, head);
        assert_eq!(pool.free_list_len(), 3);
        assert!(!pool.owns(NonNull::from(&mut on_stack).cast::<u8>()));
    }

    #[test]
    fn pointer_inside_a_slot_is_ignored() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let p = pool.allocate_growing();
        let interior = unsafe { NonNull::new_unchecked(p.as_ptr().add(4)) };
        assert!(pool.owns(interior));

        unsafe { pool.free(interior) };

        assert_eq!(pool.used(), 16);
        assert_eq!(pool.free_list_len(), 3);
    }

    #[test]
    fn slots_from_grown_blocks_can_be_freed() {
        // Membership covers every owned block, not just the first one.
        let mut pool = PoolAllocator::new(16, 1).unwrap();
        let first = pool.allocate_growing();
        let second = pool.allocate_growing();
        assert_eq!(pool.block_count(), 2);
        assert!(pool.owns(second));

        unsafe { pool.free(second) };
        assert_eq!(pool.used(), 16);
        assert_eq!(pool.allocate_growing(), second);
        assert_eq!(pool.block_count(), 2);

        unsafe { pool.free(first) };
        assert_eq!(pool.allocate(16), Some(first));
    }

    #[test]
    fn slot_memory_is_usable_and_independent() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let ptrs = fill(&mut pool, 6);
        for (i, p) in ptrs.iter().enumerate() {
            unsafe { ptr::write_unaligned(p.as_ptr() as *mut [u64; 2], [i as u64, !(i as u64)]) };
        }
        for (i, p) in ptrs.iter().enumerate() {
            let value = unsafe { ptr::read_unaligned(p.as_ptr() as *const [u64; 2]) };
            assert_eq!(value, [i as u64, !(i as u64)]);
        }
    }

    #[test]
    fn unaligned_object_sizes_still_link() {
        let size = LINK_SIZE + 3;
        let mut pool = PoolAllocator::new(size, 5).unwrap();
        let ptrs = fill(&mut pool, 5);
        for p in &ptrs {
            unsafe { pool.free(*p) };
        }
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.free_list_len(), 5);
        assert_eq!(pool.allocate(size), Some(ptrs[4]));
    }

    #[test]
    fn aligned_pool_keeps_every_slot_aligned() {
        let mut pool = PoolAllocator::with_alignment(64, 4, 64).unwrap();
        for p in fill(&mut pool, 9) {
            assert_eq!(p.as_ptr() as usize % 64, 0);
        }
        assert_eq!(pool.block_count(), 3);
    }

    #[test]
    fn sixteen_byte_pool_scenario() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        let mut ptrs = fill(&mut pool, 4);
        assert_eq!(ptrs.iter().collect::<HashSet<_>>().len(), 4);
        assert_eq!(pool.used(), 64);

        ptrs.push(pool.allocate_growing());
        assert_eq!(pool.used(), 80);
        assert_eq!(pool.block_count(), 2);

        for p in &ptrs {
            unsafe { pool.free(*p) };
        }
        assert_eq!(pool.used(), 0);

        assert_eq!(pool.allocate_growing(), ptrs[4]);
    }

    #[test]
    fn stats_report_occupancy() {
        let mut pool = PoolAllocator::new(16, 4).unwrap();
        fill(&mut pool, 5);
        let stats = pool.stats();
        assert_eq!(
            stats,
            PoolStats {
                object_size: 16,
                slots_per_block: 4,
                blocks: 2,
                used_bytes: 80,
                reserved_bytes: 128,
            }
        );
        assert_eq!(stats.live_objects(), 5);
        assert_eq!(stats.free_slots(), 3);
    }

    #[test]
    fn usable_through_the_allocator_trait() {
        let mut pool = PoolAllocator::new(16, 2).unwrap();
        let allocator: &mut dyn Allocator = &mut pool;
        let p = allocator.allocate(16).unwrap();
        assert!(allocator.owns(p));
        assert_eq!(allocator.available(), 16);
        unsafe { allocator.free(p) };
        assert_eq!(allocator.used(), 0);
    }

    #[test]
    fn drop_with_outstanding_slots_releases_everything() {
        let mut pool = PoolAllocator::new(16, 2).unwrap();
        fill(&mut pool, 7);
        assert_eq!(pool.block_count(), 4);
        drop(pool);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "pool serves 16-byte objects only")]
    fn size_mismatch_asserts_in_debug() {
        let mut pool = PoolAllocator::new(16, 2).unwrap();
        let _ = pool.allocate(8);
    }
}
