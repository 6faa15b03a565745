// world.rs - Entity lifetimes and per-type component pools

use crate::ecs::component_pool::{ComponentPool, ErasedPool};
use crate::ecs::Entity;
use crate::memory::{AllocError, PoolConfig, PoolStats};
use kiln_metrics::Counter;
use std::any::{type_name, TypeId};
use std::collections::{hash_map::Entry, HashMap};
use thiserror::Error;

/// Errors returned by [`World`] operations.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity {0:?} is not alive")]
    StaleEntity(Entity),

    #[error("failed to create component pool: {0}")]
    Alloc(#[from] AllocError),
}

/// The ECS world: hands out entities and owns one component pool per type.
pub struct World {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_indices: Vec<u32>,
    live: usize,
    pools: HashMap<TypeId, Box<dyn ErasedPool>>,
    config: PoolConfig,
    counters: Counter,
}

impl World {
    /// Create a new empty world with default pool sizing.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a world whose component pools are sized from `config`.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            free_indices: Vec::new(),
            live: 0,
            pools: HashMap::new(),
            config,
            counters: Counter::new(),
        }
    }

    /// Spawn an empty entity, recycling a despawned index when one exists.
    pub fn spawn(&mut self) -> Entity {
        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                let index = self.generations.len() as u32;
                self.generations.push(0);
                self.alive.push(false);
                index
            }
        };
        self.alive[index as usize] = true;
        self.live += 1;

        kiln_metrics::metrics! {
            self.counters.increment("entities_spawned", 1);
        }

        Entity::new(index, self.generations[index as usize])
    }

    /// Despawn an entity, dropping all of its components.
    ///
    /// Returns false if the handle is stale.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let mut removed = 0;
        for pool in self.pools.values_mut() {
            if pool.remove_entity(entity) {
                removed += 1;
            }
        }

        let idx = entity.index() as usize;
        self.alive[idx] = false;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.free_indices.push(entity.index());
        self.live -= 1;

        kiln_metrics::metrics! {
            self.counters.increment("entities_despawned", 1);
            self.counters.increment("components_removed", removed);
        }
        tracing::trace!(?entity, components = removed, "entity despawned");
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        self.alive.get(idx).copied().unwrap_or(false)
            && self.generations[idx] == entity.generation()
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.live
    }

    /// Attach `value` to `entity`, returning any component it replaced.
    ///
    /// The pool for `T` is created on first use.
    pub fn insert<T: 'static>(&mut self, entity: Entity, value: T) -> Result<Option<T>, WorldError> {
        if !self.is_alive(entity) {
            return Err(WorldError::StaleEntity(entity));
        }
        let pool = self.pool_or_create::<T>()?;
        let blocks_before = pool.pool_stats().blocks;
        let replaced = pool.insert(entity, value);
        let blocks_after = pool.pool_stats().blocks;

        if blocks_after > blocks_before {
            tracing::debug!(
                component = type_name::<T>(),
                blocks = blocks_after,
                "component pool grew"
            );
        }
        kiln_metrics::metrics! {
            self.counters.increment("pool_growths", blocks_after - blocks_before);
            if replaced.is_none() {
                self.counters.increment("components_inserted", 1);
            }
        }
        Ok(replaced)
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        if !self.is_alive(entity) {
            return None;
        }
        self.pool::<T>()?.get(entity)
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.is_alive(entity) {
            return None;
        }
        self.pool_mut::<T>()?.get_mut(entity)
    }

    /// Detach and return the `T` component of `entity`.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> Option<T> {
        if !self.is_alive(entity) {
            return None;
        }
        let value = self.pool_mut::<T>()?.remove(entity);
        kiln_metrics::metrics! {
            if value.is_some() {
                self.counters.increment("components_removed", 1);
            }
        }
        value
    }

    /// Occupancy of the pool backing `T`, if one has been created.
    pub fn pool_stats<T: 'static>(&self) -> Option<PoolStats> {
        self.pools.get(&TypeId::of::<T>()).map(|pool| pool.pool_stats())
    }

    /// Typed pool for `T`, if one has been created.
    pub fn pool<T: 'static>(&self) -> Option<&ComponentPool<T>> {
        self.pools
            .get(&TypeId::of::<T>())?
            .as_any()
            .downcast_ref::<ComponentPool<T>>()
    }

    fn pool_mut<T: 'static>(&mut self) -> Option<&mut ComponentPool<T>> {
        self.pools
            .get_mut(&TypeId::of::<T>())?
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
    }

    fn pool_or_create<T: 'static>(&mut self) -> Result<&mut ComponentPool<T>, WorldError> {
        let pool = match self.pools.entry(TypeId::of::<T>()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let capacity = self.config.capacity_for(type_name::<T>());
                tracing::debug!(component = type_name::<T>(), capacity, "creating component pool");
                v.insert(Box::new(ComponentPool::<T>::with_capacity(capacity)?))
            }
        };
        Ok(pool
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .expect("pool registered under a foreign TypeId"))
    }

    /// Engine counters (empty unless the `metrics` feature is enabled).
    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
