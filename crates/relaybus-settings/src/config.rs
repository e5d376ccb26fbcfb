//! Configuration for RelayBus
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats; the default location is
//! `relaybus/config.toml` under the platform config directory.
//!
//! Configuration is organized into logical sections:
//! - Bridge settings (address, timeouts, retries, queue and frame limits)
//! - Dispatch settings (default scope)

use relaybus_communication::{BridgeAddress, BridgeConfig, OverflowPolicy};
use relaybus_core::EventBusConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};

/// Cross-process bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Rendezvous address, `host:port` or a bare port
    pub address: String,
    /// Hub probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Delay between receiver reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// Attempts per outbound frame
    pub send_retries: u32,
    /// Delay between send attempts in milliseconds
    pub send_retry_delay_ms: u64,
    /// How long a send connection stays open after flushing, in milliseconds
    pub send_linger_ms: u64,
    /// Outbound queue capacity in frames
    pub queue_capacity: usize,
    /// Behaviour of a full outbound queue
    pub overflow_policy: OverflowPolicy,
    /// Largest accepted frame in bytes
    pub max_frame_bytes: usize,
    /// Role election rounds before giving up
    pub bind_attempts: u32,
    /// Upper bound of the random pause after a failed bind, in milliseconds
    pub bind_backoff_max_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            address: defaults.address.to_string(),
            probe_timeout_ms: defaults.probe_timeout.as_millis() as u64,
            reconnect_delay_ms: defaults.reconnect_delay.as_millis() as u64,
            send_retries: defaults.send_retries,
            send_retry_delay_ms: defaults.send_retry_delay.as_millis() as u64,
            send_linger_ms: defaults.send_linger.as_millis() as u64,
            queue_capacity: defaults.queue_capacity,
            overflow_policy: defaults.overflow_policy,
            max_frame_bytes: defaults.max_frame_bytes,
            bind_attempts: defaults.bind_attempts,
            bind_backoff_max_ms: defaults.bind_backoff_max.as_millis() as u64,
        }
    }
}

impl BridgeSettings {
    /// Bridge configuration described by these settings
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            address: BridgeAddress::parse(&self.address),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            send_retries: self.send_retries,
            send_retry_delay: Duration::from_millis(self.send_retry_delay_ms),
            send_linger: Duration::from_millis(self.send_linger_ms),
            queue_capacity: self.queue_capacity,
            overflow_policy: self.overflow_policy,
            max_frame_bytes: self.max_frame_bytes,
            bind_attempts: self.bind_attempts,
            bind_backoff_max: Duration::from_millis(self.bind_backoff_max_ms),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("bridge.probe_timeout_ms", self.probe_timeout_ms),
            ("bridge.reconnect_delay_ms", self.reconnect_delay_ms),
            ("bridge.send_retries", u64::from(self.send_retries)),
            ("bridge.queue_capacity", self.queue_capacity as u64),
            ("bridge.max_frame_bytes", self.max_frame_bytes as u64),
            ("bridge.bind_attempts", u64::from(self.bind_attempts)),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValueOutOfRange {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Local dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Scope used by unscoped publishes
    pub default_scope: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_scope: EventBusConfig::default().default_scope,
        }
    }
}

/// Complete RelayBus configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Bridge settings
    pub bridge: BridgeSettings,
    /// Dispatch settings
    pub dispatch: DispatchSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform default location of the config file
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("relaybus").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no config directory on this platform".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.bridge.address.trim().is_empty() {
            return Err(SettingsError::InvalidSetting {
                key: "bridge.address".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.bridge.validate()?;

        if self.dispatch.default_scope.trim().is_empty() {
            return Err(SettingsError::InvalidSetting {
                key: "dispatch.default_scope".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Bridge configuration described by this config
    pub fn to_bridge_config(&self) -> BridgeConfig {
        self.bridge.to_bridge_config()
    }

    /// Event bus configuration described by this config
    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            default_scope: self.dispatch.default_scope.clone(),
        }
    }
}
