//! Configuration - run defaults loaded from YAML
//!
//! Lookup order: an explicit path, `./cpdt.yaml`, then `cpdt/config.yaml`
//! in the user config directory. Missing files fall through to the next
//! candidate; a file that exists but does not parse is an error.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::analysis::DEFAULT_TRACKED_BINS;
use crate::core::layout::LayoutKind;
use crate::core::reader::DEFAULT_SENTINEL_ITEM;
use crate::entities::DEFAULT_PASS_BIN;

/// File name looked up in the working directory
pub const LOCAL_CONFIG: &str = "cpdt.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yml::Error,
    },
}

fn default_pass_bin() -> i64 {
    DEFAULT_PASS_BIN
}

fn default_tracked_bins() -> Vec<i64> {
    DEFAULT_TRACKED_BINS.to_vec()
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL_ITEM.to_string()
}

/// Run defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bin counted as passing
    #[serde(default = "default_pass_bin")]
    pub pass_bin: i64,

    /// Bins reported individually in the yield table
    #[serde(default = "default_tracked_bins")]
    pub tracked_bins: Vec<i64>,

    /// Grid layout of input files
    #[serde(default)]
    pub layout: LayoutKind,

    /// Item name marking a non-parameter column
    #[serde(default = "default_sentinel")]
    pub sentinel_item: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pass_bin: default_pass_bin(),
            tracked_bins: default_tracked_bins(),
            layout: LayoutKind::default(),
            sentinel_item: default_sentinel(),
        }
    }
}

impl Config {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse config text; an empty document gives the defaults
    pub fn from_yaml(text: &str) -> Result<Self, serde_yml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(text)
    }

    /// User-level config file location
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cpdt").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Resolve and load the config
    ///
    /// An explicit path must exist; the implicit candidates are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let candidates =
            std::iter::once(PathBuf::from(LOCAL_CONFIG)).chain(Self::user_config_path());
        for path in candidates {
            if path.is_file() {
                debug!("Using config {}", path.display());
                return Self::from_file(&path);
            }
        }
        debug!("No config file found; using defaults");
        Ok(Self::default())
    }
}
