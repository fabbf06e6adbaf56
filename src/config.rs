//! Host configuration
//!
//! Loaded from a JSON file; every missing field falls back to its default.

use crate::host::GasSchedule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Reference host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub gas_schedule: GasSchedule,
    /// Accounts are spread over this many shards
    pub num_shards: u32,
    pub default_gas_price: u64,
    /// Nested activations allowed below a transaction
    pub max_call_depth: usize,
    /// Flat gas cost of one built-in function call
    pub builtin_function_cost: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            gas_schedule: GasSchedule::default(),
            num_shards: 1,
            default_gas_price: 1,
            max_call_depth: 64,
            builtin_function_cost: 1_000,
        }
    }
}

impl HostConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::File::open(path)?;
        let config: HostConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        log::debug!("loaded host config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_shards == 0 {
            return Err(ConfigError::Invalid("num_shards must be at least 1".to_string()));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_call_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
