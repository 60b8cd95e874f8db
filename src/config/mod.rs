//! Configuration: process settings from the environment and user settings
//! persisted on disk.

pub mod service;
pub mod settings;

pub use service::{ConfigError, ServiceConfig};
pub use settings::{Settings, SettingsError, SettingsHandle, SettingsStore};
