//! Optional TOML application config.
//!
//! Every key is optional; command-line flags win over the file.

use crate::datadir::GenuineDataPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up inside the chain directory
pub const APP_CONFIG_FILE: &str = "appconfig.toml";

/// Application settings loaded from TOML
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database cache in MB
    #[serde(default)]
    pub cache: Option<u64>,
    /// IPC endpoint name or path
    #[serde(default)]
    pub ipc_path: Option<String>,
    /// Disable peer discovery
    #[serde(default)]
    pub no_discover: Option<bool>,
    /// Use light key derivation
    #[serde(default)]
    pub light_kdf: Option<bool>,
    /// What counts as genuine legacy chain data
    #[serde(default)]
    pub migration: Option<GenuineDataPolicy>,
}

impl AppConfig {
    /// Load from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, AppConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| AppConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| AppConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_optional(path: &Path) -> Result<Self, AppConfigError> {
        if path.is_file() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// App config errors
#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    /// The file could not be read
    #[error("invalid app config {path}: {reason}")]
    Read {
        /// File
        path: PathBuf,
        /// Cause
        reason: String,
    },
    /// The file is not valid TOML for this config
    #[error("invalid app config {path}: {reason}")]
    Parse {
        /// File
        path: PathBuf,
        /// Parser message
        reason: String,
    },
}
