//! Kiln Services Layer
//!
//! Platform-facing services the engine boots with. Currently settings
//! persistence.

pub mod settings;

pub use settings::{Settings, SettingsError};
