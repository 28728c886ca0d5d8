//! Configuration for the LANTERN CLI.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// CLI configuration, loaded from a TOML file when one is given.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Payload bytes per packet
    #[serde(default = "default_block_size")]
    pub block_size: u16,
    /// Systematic sweeps emitted per send
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Extra fountain symbols appended after the sweeps
    #[serde(default)]
    pub fountain: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            rounds: default_rounds(),
            fountain: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (overridden by `RUST_LOG`)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_block_size() -> u16 {
    lantern_files::DEFAULT_BLOCK_SIZE
}

fn default_rounds() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from a TOML file, or fall back to defaults when no path is
    /// given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}
