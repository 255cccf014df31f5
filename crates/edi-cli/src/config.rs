//! Settings file support
//!
//! The settings file is YAML or JSON, chosen by extension:
//!
//! ```yaml
//! map_path:
//!   - maps
//!   - /usr/share/x12/maps
//! code_lists: codes.yaml
//! strict: false
//! charset: extended
//! ```
//!
//! Command-line flags override whatever the file says.

use edi_validation::{Charset, ValidationConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Map directories searched when neither the file nor the flags name any
pub const DEFAULT_MAP_PATHS: [&str; 2] = ["maps", "."];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Contents of a settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub map_path: Vec<PathBuf>,
    pub code_lists: Option<PathBuf>,
    pub strict: Option<bool>,
    pub charset: Option<Charset>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
            _ => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Map directories: flags first, then the file, then the defaults
    pub fn map_paths(&self, flags: &[PathBuf]) -> Vec<PathBuf> {
        if !flags.is_empty() {
            return flags.to_vec();
        }
        if !self.map_path.is_empty() {
            return self.map_path.clone();
        }
        DEFAULT_MAP_PATHS.iter().map(PathBuf::from).collect()
    }

    /// Validation options after applying the flags
    pub fn validation(&self, strict: bool, charset: Option<Charset>) -> ValidationConfig {
        ValidationConfig::new()
            .strict(strict || self.strict.unwrap_or(false))
            .charset(charset.or(self.charset).unwrap_or_default())
    }

    /// Code list file named by the flag, else by the file
    pub fn code_lists(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf).or_else(|| self.code_lists.clone())
    }
}
