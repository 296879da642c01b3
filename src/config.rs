//! User configuration for the logscope binary
//!
//! Read from `~/.logscope/config.toml` unless another file is given with
//! `--config`. A missing default file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use logscope_types::PriorityMask;
use serde::{Deserialize, Serialize};

/// Rows printed by `logs` when no limit is given
const DEFAULT_ROW_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mask written by a filter reset, e.g. `"notset,all"`
    pub default_mask: String,

    /// Default tracing directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Maximum rows printed by `logs`
    pub row_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_mask: "notset,all".to_string(),
            log_level: "warn".to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(".logscope").join("config.toml"))
    }

    /// Load an explicit file, or the default one if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Reset mask, `NOT_SET` kept alongside concrete bits as the store expects
    pub fn default_mask(&self) -> Result<PriorityMask> {
        let mut mask = PriorityMask::empty();
        for token in self.default_mask.split([',', '|']) {
            let bits: PriorityMask = token
                .parse()
                .with_context(|| format!("Invalid default_mask '{}'", self.default_mask))?;
            mask |= bits;
        }
        Ok(mask)
    }
}
