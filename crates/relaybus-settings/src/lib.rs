//! RelayBus Settings Crate
//!
//! Loads, validates and saves the configuration file that sets up the
//! event bus and its cross-process bridge.

pub mod config;
pub mod error;

pub use config::{BridgeSettings, Config, DispatchSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
