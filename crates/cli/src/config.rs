//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_URL: &str = "http://localhost:5001";

/// CLI configuration, read from `~/.config/scalectl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Webhook base URL
    pub url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Missing file is an empty configuration
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("scalectl").join("config.json"))
    }

    /// Flag or environment first, then the file, then the default
    pub fn resolve_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.url.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string())
    }
}
