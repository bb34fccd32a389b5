//! Configuration file loading.
//!
//! Hardware descriptions are TOML files. [`ConfigLoader`] parses any
//! deserializable type from disk; [`load_hardware`] additionally runs the
//! semantic checks of [`HardwareInfo::validate`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use ecat_common::config::{load_hardware, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let info = load_hardware(Path::new("/etc/ecat/hardware.toml"))?;
//!     println!("{} joints on {}", info.joints.len(), info.hardware.interface_name);
//!     Ok(())
//! }
//! ```

use crate::consts::HAL_SERVICE_NAME;
use crate::hal::config::HardwareInfo;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// File unreadable or not valid TOML for the target type.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but semantically invalid.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log verbosity, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-cycle detail, including decoded process data.
    Trace,
    /// Bring-up steps and mode switches.
    Debug,
    /// Lifecycle transitions.
    #[default]
    Info,
    /// Recoverable cycle failures.
    Warn,
    /// Fatal errors only.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Service identity and logging, `[shared]` table.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "ecat-hal-cell-2"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier used in log output.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: HAL_SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load any deserializable type from a TOML file.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if it cannot be read or parsed
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Load a hardware description and validate it.
pub fn load_hardware(path: &Path) -> Result<HardwareInfo, ConfigError> {
    let info = HardwareInfo::load(path)?;
    if let Some(shared) = &info.shared {
        shared.validate()?;
    }
    info.validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    debug!("Loaded hardware description from {}", path.display());
    Ok(info)
}
