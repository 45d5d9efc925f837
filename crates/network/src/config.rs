use anyhow::{ensure, Result};
use peerwire_common::utils::config::{load_config, load_config_with_env};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compression::{CompressionAlgorithm, CompressionLevel};

const ENV_PREFIX: &str = "PEERWIRE";

/// Message compression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress outgoing messages. Incoming compressed messages are always
    /// accepted.
    pub enabled: bool,
    pub algorithm: CompressionAlgorithm,
    pub level: CompressionLevel,
    /// Fraction of the original size a compressed message must save,
    /// in `[0, 1)`. Zero accepts any message that shrinks by a byte.
    pub min_savings_ratio: f64,
    pub pool: PoolConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: CompressionAlgorithm::Deflate,
            level: CompressionLevel::Default,
            min_savings_ratio: 0.0,
            pool: PoolConfig::default(),
        }
    }
}

impl CompressionConfig {
    /// Load and validate settings from a TOML/YAML/JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Self::from_file`], with `PEERWIRE__*` environment overrides,
    /// e.g. `PEERWIRE__POOL__MAX_BUFFER_SIZE=65536`.
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = load_config_with_env(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..1.0).contains(&self.min_savings_ratio),
            "min_savings_ratio must be in [0, 1), got {}",
            self.min_savings_ratio
        );
        ensure!(self.pool.max_buffer_size > 0, "pool.max_buffer_size must be positive");
        Ok(())
    }

    /// `min_savings_ratio` clamped into `[0, 1)`.
    pub fn savings_ratio(&self) -> f64 {
        if self.min_savings_ratio.is_nan() {
            return 0.0;
        }
        self.min_savings_ratio.clamp(0.0, 0.99)
    }
}

/// Buffer pool limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Total bytes kept for reuse; released buffers beyond this are dropped
    pub max_pooled_bytes: usize,
    /// Largest single buffer the pool hands out
    pub max_buffer_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pooled_bytes: 16 * 1024 * 1024,
            max_buffer_size: 4 * 1024 * 1024,
        }
    }
}
