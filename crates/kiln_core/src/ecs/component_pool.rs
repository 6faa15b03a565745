// component_pool.rs - Typed component storage backed by a pool allocator
//
// One pool per component type. Values live in pool slots, so creating and
// destroying components only touches the system heap when a block is added.

use crate::ecs::Entity;
use crate::memory::{align_up, AllocError, Allocator, PoolAllocator, PoolStats};
use std::any::Any;
use std::collections::HashMap;
use std::mem;
use std::ptr::{self, NonNull};

/// Storage for every component of type `T`, keyed by entity.
///
/// Slots are `size_of::<T>()` rounded up to hold a free-list link and to
/// keep `T` aligned. Live values are dropped before the pool releases its
/// blocks.
pub struct ComponentPool<T> {
    allocator: PoolAllocator,
    slots: HashMap<Entity, NonNull<T>>,
}

impl<T> ComponentPool<T> {
    /// Alignment of every slot.
    pub const SLOT_ALIGN: usize = if mem::align_of::<T>() > mem::align_of::<*mut u8>() {
        mem::align_of::<T>()
    } else {
        mem::align_of::<*mut u8>()
    };

    /// Bytes per slot.
    pub const SLOT_SIZE: usize = {
        let size = if mem::size_of::<T>() > mem::size_of::<*mut u8>() {
            mem::size_of::<T>()
        } else {
            mem::size_of::<*mut u8>()
        };
        align_up(size, Self::SLOT_ALIGN)
    };

    /// Create a pool whose blocks hold `capacity` components each.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            allocator: PoolAllocator::with_alignment(Self::SLOT_SIZE, capacity, Self::SLOT_ALIGN)?,
            slots: HashMap::with_capacity(capacity),
        })
    }

    /// Store `value` for `entity`, returning the value it replaced.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(slot) = self.slots.get(&entity) {
            // SAFETY: slots in the map hold initialized values.
            return Some(unsafe { ptr::replace(slot.as_ptr(), value) });
        }
        let slot = self.allocator.allocate_growing().cast::<T>();
        // SAFETY: fresh slot, sized and aligned for `T`.
        unsafe { slot.as_ptr().write(value) };
        self.slots.insert(entity, slot);
        None
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        // SAFETY: slots in the map hold initialized values.
        self.slots.get(&entity).map(|slot| unsafe { &*slot.as_ptr() })
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        // SAFETY: as in `get`; `&mut self` makes the borrow unique.
        self.slots
            .get(&entity)
            .map(|slot| unsafe { &mut *slot.as_ptr() })
    }

    /// Move the component out and return its slot to the pool.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slots.remove(&entity)?;
        // SAFETY: the slot held an initialized value and is no longer
        // reachable through the map.
        unsafe {
            let value = slot.as_ptr().read();
            self.allocator.free(slot.cast());
            Some(value)
        }
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate components in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        // SAFETY: slots in the map hold initialized values.
        self.slots
            .iter()
            .map(|(entity, slot)| (*entity, unsafe { &*slot.as_ptr() }))
    }

    #[inline]
    pub fn pool_stats(&self) -> PoolStats {
        self.allocator.stats()
    }
}

impl<T> Drop for ComponentPool<T> {
    fn drop(&mut self) {
        for (_, slot) in self.slots.drain() {
            // SAFETY: each slot holds an initialized value that is dropped
            // and freed exactly once.
            unsafe {
                ptr::drop_in_place(slot.as_ptr());
                self.allocator.free(slot.cast());
            }
        }
    }
}

/// Type-erased view of a [`ComponentPool`] so the world can hold one per
/// component type.
pub(crate) trait ErasedPool {
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn pool_stats(&self) -> PoolStats;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedPool for ComponentPool<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn pool_stats(&self) -> PoolStats {
        self.allocator.stats()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
