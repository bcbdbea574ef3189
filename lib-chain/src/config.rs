//! Chain configuration
//!
//! TOML file with three sections. Every field has a default, so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! [database]
//! path = "./data/chain.sqlite"
//! max_connections = 4
//! acquire_timeout_secs = 30
//!
//! [genesis]
//! path = "./genesis.json"
//!
//! [apply]
//! progress_step_percent = 10
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::Block;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub database: DatabaseConfig,
    pub genesis: GenesisConfig,
    pub apply: ApplyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    /// Pool acquire timeout; surfaces as a persistence error when exceeded
    pub acquire_timeout_secs: u64,
    /// Ignore `path` and use a private in-memory database
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/chain.sqlite"),
            max_connections: 4,
            acquire_timeout_secs: 30,
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// JSON file holding the genesis block
    pub path: PathBuf,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./genesis.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Genesis loading logs a line every this many percent
    pub progress_step_percent: u8,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            progress_step_percent: 10,
        }
    }
}

impl ChainConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid configuration {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse the configured genesis block
    pub async fn load_genesis(&self) -> Result<Block> {
        let path = &self.genesis.path;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read genesis block {}", path.display()))?;
        let block: Block = serde_json::from_str(&content)
            .with_context(|| format!("Invalid genesis block {}", path.display()))?;
        if !block.is_genesis() {
            anyhow::bail!(
                "Genesis block {} has height {}, expected 1",
                block.id,
                block.height
            );
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = ChainConfig::from_toml("").unwrap();
        assert_eq!(config, ChainConfig::default());
        assert_eq!(config.apply.progress_step_percent, 10);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = ChainConfig::from_toml(
            r#"
            [database]
            in_memory = true

            [apply]
            progress_step_percent = 25
            "#,
        )
        .unwrap();

        assert!(config.database.in_memory);
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.apply.progress_step_percent, 25);
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        assert!(ChainConfig::from_toml("[database]\nmax_connections = \"many\"").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ChainConfig::load(dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config, ChainConfig::default());
    }

    #[tokio::test]
    async fn test_load_genesis_rejects_non_genesis_height() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("genesis.json");
        tokio::fs::write(
            &path,
            r#"{"id":"2","height":2,"generatorPublicKey":"aa","transactions":[]}"#,
        )
        .await
        .unwrap();

        let mut config = ChainConfig::default();
        config.genesis.path = path;
        assert!(config.load_genesis().await.is_err());
    }
}
