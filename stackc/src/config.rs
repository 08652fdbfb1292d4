//! Lowering configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults;
//! 2. a TOML file (`stackc.toml` or `--config PATH`);
//! 3. `STACKC_*` environment variables.
//!
//! # Example
//!
//! ```toml
//! evm-version = "berlin"
//! scratch-memory-start = 512
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::EvmVersion;
use crate::types::MemoryPositions;

/// Environment variable overriding [`LowerConfig::evm_version`].
pub const ENV_EVM_VERSION: &str = "STACKC_EVM_VERSION";
/// Environment variable overriding [`LowerConfig::scratch_memory_start`].
pub const ENV_SCRATCH_START: &str = "STACKC_SCRATCH_START";

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Settings for one lowering pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LowerConfig {
    /// VM ruleset the IR targets.
    pub evm_version: EvmVersion,
    /// First byte handed out for scratch placeholders.
    pub scratch_memory_start: u64,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self {
            evm_version: EvmVersion::default(),
            scratch_memory_start: MemoryPositions::RESERVED_MEMORY,
        }
    }
}

impl LowerConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: LowerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `STACKC_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_EVM_VERSION) {
            self.evm_version = value.parse().map_err(|e: crate::context::UnknownEvmVersion| {
                ConfigError::InvalidValue {
                    key: ENV_EVM_VERSION.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = lookup(ENV_SCRATCH_START) {
            self.scratch_memory_start =
                value.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        key: ENV_SCRATCH_START.to_string(),
                        value: value.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let start = self.scratch_memory_start;
        if start < MemoryPositions::RESERVED_MEMORY || start % 32 != 0 {
            return Err(ConfigError::InvalidValue {
                key: "scratch-memory-start".to_string(),
                value: start.to_string(),
                reason: format!(
                    "must be a multiple of 32 no lower than {}",
                    MemoryPositions::RESERVED_MEMORY
                ),
            });
        }
        Ok(())
    }
}
