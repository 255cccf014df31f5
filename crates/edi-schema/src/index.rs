//! Index of maps by interchange and functional group version

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// File name of the index inside a map search path
pub const INDEX_FILE: &str = "maps.json";

/// One index entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MapIndexEntry {
    /// Interchange control version number (ISA12)
    pub icvn: String,
    /// Functional identifier code (GS01)
    pub fic: String,
    /// Version / release / industry identifier code (GS08)
    pub vriic: String,
    /// Map identifier or file name
    pub file: String,
}

/// Lookup table from envelope versions to map files
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapIndex {
    #[serde(default)]
    pub maps: Vec<MapIndexEntry>,
}

impl MapIndex {
    /// Parse an index from JSON
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidFormat(format!("map index parse error: {e}")))
    }

    /// Read an index file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Map file registered for the given versions
    pub fn resolve(&self, icvn: &str, fic: &str, vriic: &str) -> Option<&str> {
        self.maps
            .iter()
            .find(|entry| entry.icvn == icvn && entry.fic == fic && entry.vriic == vriic)
            .map(|entry| entry.file.as_str())
    }
}
