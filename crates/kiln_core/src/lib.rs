//! Kiln Engine Core
//!
//! Contains the fundamental simulation systems:
//! - Memory management (allocator capability, fixed-size pools)
//! - Entity Component System backed by those pools

pub mod ecs;
pub mod memory;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
