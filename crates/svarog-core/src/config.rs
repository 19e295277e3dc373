//! Process-level configuration.
//!
//! Covers the ambient knobs of a deployment: medium geometry, job queue
//! capacity, registry bound and the seqlock retry budget. Values merge in
//! the usual precedence order: built-in defaults, then `Svarog.toml`, then
//! `SVAROG_*` environment variables.
//!
//! Block definitions are *not* configuration; they are runtime records
//! passed to `register_block`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::medium::Geometry;
use crate::mirror::SEQLOCK_MAX_RETRIES;
use crate::queue::JOB_QUEUE_CAPACITY;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Extraction from the figment providers failed.
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Medium geometry knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumConfig {
    /// Total capacity in bytes.
    pub capacity: u32,
    /// Program page size in bytes.
    pub page_size: u32,
    /// Erase block size in bytes; also the slot size.
    pub block_size: u32,
    /// Erase cycles per block before the driver refuses.
    pub endurance: u32,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            capacity: 65536,
            page_size: 256,
            block_size: 1024,
            endurance: 100_000,
        }
    }
}

impl MediumConfig {
    /// The corresponding driver geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry {
            capacity: self.capacity,
            page_size: self.page_size,
            block_size: self.block_size,
            endurance: self.endurance,
        }
    }
}

/// Job queue knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue depth bound.
    pub capacity: usize,
    /// Most blocks the registry accepts.
    pub max_blocks: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: JOB_QUEUE_CAPACITY,
            max_blocks: 64,
        }
    }
}

/// Seqlock mirror knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Reader restart bound before a snapshot fails.
    pub max_read_retries: u32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_read_retries: SEQLOCK_MAX_RETRIES,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvarogConfig {
    /// Medium geometry.
    pub medium: MediumConfig,
    /// Queue and registry bounds.
    pub queue: QueueConfig,
    /// Seqlock mirror behaviour.
    pub mirror: MirrorConfig,
}

impl SvarogConfig {
    /// Loads configuration from defaults, `Svarog.toml` and `SVAROG_*`
    /// environment variables (for nested keys use `SVAROG_MEDIUM__CAPACITY`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file("Svarog.toml"))
                .merge(Env::prefixed("SVAROG_").split("__")),
        )
    }

    /// Loads configuration from an explicit TOML file over the defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path)),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// Useful for dumping the merged defaults/file/environment result.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.medium
            .geometry()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue capacity must be non-zero".into()));
        }
        if self.queue.max_blocks == 0 {
            return Err(ConfigError::Invalid("max_blocks must be non-zero".into()));
        }
        if self.mirror.max_read_retries == 0 {
            return Err(ConfigError::Invalid(
                "mirror max_read_retries must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
