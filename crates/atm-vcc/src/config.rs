//! Stack configuration with validation.
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::device::{CiRange, DeviceDefaults};
use crate::domain::vcc::{BufferLimits, DEFAULT_BUFFER_BOUND, DEFAULT_MESSAGE_OVERHEAD};

/// Backlog used when `listen(0)` is requested.
pub const DEFAULT_BACKLOG: u32 = 32;

/// Main stack configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Per-VCC buffer bounds
    pub buffers: BufferConfig,
    /// Listener defaults
    pub listen: ListenConfig,
    /// Defaults for newly registered devices
    pub device: DeviceConfig,
}

impl StackConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffers.send_bound == 0 {
            return Err(ConfigError::InvalidBuffer("send_bound cannot be 0"));
        }
        if self.buffers.receive_bound == 0 {
            return Err(ConfigError::InvalidBuffer("receive_bound cannot be 0"));
        }
        if self.listen.default_backlog == 0 {
            return Err(ConfigError::InvalidBacklog);
        }
        if self.device.vpi_bits > CiRange::MAX_VPI_BITS {
            return Err(ConfigError::InvalidRange("vpi_bits exceeds 12"));
        }
        if self.device.vci_bits > CiRange::MAX_VCI_BITS {
            return Err(ConfigError::InvalidRange("vci_bits exceeds 16"));
        }
        if self.device.vci_bits < CiRange::MIN_VCI_BITS {
            return Err(ConfigError::InvalidRange("vci_bits leaves no unreserved VCI"));
        }
        Ok(())
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            send_bound: self.buffers.send_bound,
            receive_bound: self.buffers.receive_bound,
            message_overhead: self.buffers.message_overhead,
        }
    }

    pub fn device_defaults(&self) -> DeviceDefaults {
        DeviceDefaults {
            // Checked by validate(); an unchecked config keeps the default range.
            ci_range: CiRange::new(self.device.vpi_bits, self.device.vci_bits)
                .unwrap_or_default(),
            link_rate: self.device.link_rate,
        }
    }
}

/// Buffer bound configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Negotiated send bound in bytes (default: 212992)
    pub send_bound: usize,
    /// Receive charging bound in bytes (default: 212992)
    pub receive_bound: usize,
    /// Per-message overhead used by admission (default: 256)
    pub message_overhead: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            send_bound: DEFAULT_BUFFER_BOUND,
            receive_bound: DEFAULT_BUFFER_BOUND,
            message_overhead: DEFAULT_MESSAGE_OVERHEAD,
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub default_backlog: u32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            default_backlog: DEFAULT_BACKLOG,
        }
    }
}

/// Device defaults configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub vpi_bits: u8,
    pub vci_bits: u8,
    /// Cells per second (default: OC-3)
    pub link_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let defaults = DeviceDefaults::default();
        Self {
            vpi_bits: defaults.ci_range.vpi_bits(),
            vci_bits: defaults.ci_range.vci_bits(),
            link_rate: defaults.link_rate,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("invalid buffer bound: {0}")]
    InvalidBuffer(&'static str),

    #[error("default backlog cannot be 0")]
    InvalidBacklog,

    #[error("invalid VPI/VCI range: {0}")]
    InvalidRange(&'static str),
}
