use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KeyboxError, KeyboxResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboxConfig {
    pub store: StoreConfig,
    pub log: LogConfig,
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing file of the password box (default: password.data)
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Defaults for the `generate` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Length used when none is given on the command line
    pub length: usize,
    /// Special character set used by `--special-char`
    pub special_chars: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("password.data"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            length: 16,
            special_chars: "~!@#$%^&*".into(),
        }
    }
}

impl KeyboxConfig {
    /// Load the config file at `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> KeyboxResult<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KeyboxError::Config(format!("parsing {}: {e}", path.display())))
    }
}
