//! Entity Component System
//!
//! Entities are generational handles; each component type lives in its own
//! [`ComponentPool`], a typed wrapper over the fixed-size
//! [`PoolAllocator`](crate::memory::PoolAllocator).

mod component_pool;
mod entity;
mod world;

pub use component_pool::ComponentPool;
pub use entity::Entity;
pub use world::{World, WorldError};
