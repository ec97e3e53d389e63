//! Configuration loading and representation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DATA_DIR_VAR: &str = "PARQUE_DATA_DIR";
pub const SEED_CATALOG_VAR: &str = "PARQUE_SEED_CATALOG";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Where inventory data lives and how a fresh data directory is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `materials.json` and `movements.json`.
    pub data_dir: PathBuf,
    /// Seed the default catalog when no materials file exists yet.
    pub seed_default_catalog: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            seed_default_catalog: true,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn without_seed(mut self) -> Self {
        self.seed_default_catalog = false;
        self
    }

    /// Read `PARQUE_DATA_DIR` / `PARQUE_SEED_CATALOG`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(SEED_CATALOG_VAR) {
            config.seed_default_catalog = parse_flag(&raw).ok_or(ConfigError::InvalidValue {
                key: SEED_CATALOG_VAR,
                value: raw,
            })?;
        }
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
