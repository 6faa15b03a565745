use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sizing of the per-component pools.
///
/// Capacities are slots per block. A pool that runs out grows by another
/// block of the same capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Slots per block for component types without an override.
    pub default_capacity: usize,
    /// Overrides keyed by component type name (`std::any::type_name`).
    pub capacities: HashMap<String, usize>,
}

impl PoolConfig {
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Slots per block for the named component type. Never zero.
    pub fn capacity_for(&self, type_name: &str) -> usize {
        self.capacities
            .get(type_name)
            .copied()
            .unwrap_or(self.default_capacity)
            .max(1)
    }

    pub fn with_capacity(mut self, type_name: impl Into<String>, capacity: usize) -> Self {
        self.capacities.insert(type_name.into(), capacity);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_capacity: Self::DEFAULT_CAPACITY,
            capacities: HashMap::new(),
        }
    }
}
