//! Device configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::constants::{
    EMULATOR_ADDR, ENTROPY_CHUNK_SIZE, LEGACY_TX_PAGE_SIZE, SKYWALLET_PRODUCT_ID,
    SKYWALLET_VENDOR_ID, TX_PAGE_SIZE,
};
use crate::transport::DeviceType;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Firmware protocol revision. Selects the signing page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
    /// Older firmware, 7 items per page.
    Legacy,
    #[default]
    Current,
}

impl ProtocolRevision {
    pub fn page_size(self) -> usize {
        match self {
            ProtocolRevision::Legacy => LEGACY_TX_PAGE_SIZE,
            ProtocolRevision::Current => TX_PAGE_SIZE,
        }
    }
}

/// Configuration passed to every device operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Physical device or emulator.
    pub device_type: DeviceType,
    /// Protocol revision of the target firmware.
    pub protocol_revision: ProtocolRevision,
    /// Overrides the page size implied by `protocol_revision`.
    pub page_size: Option<usize>,
    /// Bytes requested per entropy round.
    pub entropy_chunk_size: u32,
    /// Emulator UDP endpoint.
    pub emulator_addr: String,
    /// Read timeout for the emulator transport. `None` blocks forever.
    pub read_timeout_ms: Option<u64>,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            protocol_revision: ProtocolRevision::default(),
            page_size: None,
            entropy_chunk_size: ENTROPY_CHUNK_SIZE,
            emulator_addr: EMULATOR_ADDR.to_string(),
            read_timeout_ms: None,
            vendor_id: SKYWALLET_VENDOR_ID,
            product_id: SKYWALLET_PRODUCT_ID,
        }
    }
}

impl DeviceConfig {
    /// Default configuration for the given device type.
    pub fn for_device(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Default::default()
        }
    }

    /// Effective signing page size.
    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or_else(|| self.protocol_revision.page_size())
    }

    /// Reject values no operation can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == Some(0) {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.entropy_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "entropy_chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeviceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
