//! Memory management
//!
//! Fixed-size pool allocation for component storage, built on a small
//! allocator capability that future allocator variants share.

mod allocator;
mod config;
mod error;
mod pool_allocator;

pub use allocator::{align_up, calculate_padding, Allocator, AllocatorState};
pub use config::PoolConfig;
pub use error::AllocError;
pub use pool_allocator::{PoolAllocator, PoolStats};
