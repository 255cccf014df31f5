//! External code sets
//!
//! Elements whose codes are too many to list in the map (state codes,
//! provider taxonomies, place-of-service codes) name a code set instead.
//! The engine asks a [`CodeSetLookup`] about them. Unknown sets are
//! unconstrained, so a missing code-list file never rejects an interchange.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Lookup service for externally defined code sets
pub trait CodeSetLookup: Send + Sync {
    /// Whether `value` belongs to the set named `set_key`
    ///
    /// An empty or unknown key means the set is unconstrained.
    fn is_valid_code(&self, set_key: &str, value: &str) -> bool;
}

/// Lookup that accepts every code
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CodeSetLookup for AcceptAll {
    fn is_valid_code(&self, _set_key: &str, _value: &str) -> bool {
        true
    }
}

/// A code list containing allowed values
#[derive(Debug, Clone)]
pub struct CodeList {
    /// Name/identifier of the code list
    pub name: String,
    /// Set of allowed codes
    codes: HashSet<String>,
    /// Whether validation is case-sensitive
    pub case_sensitive: bool,
    /// Description for documentation
    pub description: Option<String>,
}

impl CodeList {
    /// Create a new empty code list
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            codes: HashSet::new(),
            case_sensitive: true,
            description: None,
        }
    }

    /// Create with a set of codes
    pub fn with_codes(name: impl Into<String>, codes: Vec<impl Into<String>>) -> Self {
        let mut list = Self::new(name);
        list.codes = codes.into_iter().map(Into::into).collect();
        list
    }

    /// Set case sensitivity
    #[must_use]
    pub fn case_sensitive(mut self, sensitive: bool) -> Self {
        self.case_sensitive = sensitive;
        self
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add a code to the list
    pub fn add(&mut self, code: impl Into<String>) {
        self.codes.insert(code.into());
    }

    /// Check if a code is valid
    #[must_use]
    pub fn is_valid(&self, code: &str) -> bool {
        if self.case_sensitive {
            self.codes.contains(code)
        } else {
            self.codes.iter().any(|c| c.eq_ignore_ascii_case(code))
        }
    }

    /// Check if code list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Get number of codes
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

/// On-disk form of one code list: either a bare array of codes or an
/// object with options
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeListFile {
    Codes(Vec<String>),
    Detailed {
        codes: Vec<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_case_sensitive")]
        case_sensitive: bool,
    },
}

fn default_case_sensitive() -> bool {
    true
}

impl CodeListFile {
    fn into_list(self, name: String) -> CodeList {
        match self {
            CodeListFile::Codes(codes) => CodeList::with_codes(name, codes),
            CodeListFile::Detailed {
                codes,
                description,
                case_sensitive,
            } => {
                let mut list = CodeList::with_codes(name, codes).case_sensitive(case_sensitive);
                list.description = description;
                list
            }
        }
    }
}

/// Code list registry for managing multiple code lists
#[derive(Debug, Clone, Default)]
pub struct CodeListRegistry {
    lists: HashMap<String, CodeList>,
}

impl CodeListRegistry {
    /// Create a new registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse code lists from JSON, keyed by set name
    ///
    /// ```json
    /// { "states": ["TN", "GA"], "pos": { "codes": ["11", "21"], "description": "Place of service" } }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeList`] when the content is malformed.
    pub fn from_json(content: &str) -> Result<Self> {
        let files: BTreeMap<String, CodeListFile> = serde_json::from_str(content)
            .map_err(|e| Error::CodeList(format!("JSON parse error: {e}")))?;
        Ok(Self::from_files(files))
    }

    /// Parse code lists from YAML, keyed by set name
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeList`] when the content is malformed.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let files: BTreeMap<String, CodeListFile> = serde_yaml::from_str(content)
            .map_err(|e| Error::CodeList(format!("YAML parse error: {e}")))?;
        Ok(Self::from_files(files))
    }

    /// Load code lists from a `.json`, `.yaml` or `.yml` file
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read and
    /// [`Error::CodeList`] when it cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let registry = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&content)?,
            _ => Self::from_json(&content)?,
        };
        info!(
            path = %path.display(),
            lists = registry.lists.len(),
            "Loaded code lists"
        );
        Ok(registry)
    }

    fn from_files(files: BTreeMap<String, CodeListFile>) -> Self {
        let mut registry = Self::new();
        for (name, file) in files {
            registry.register(file.into_list(name));
        }
        registry
    }

    /// Register a code list
    pub fn register(&mut self, list: CodeList) {
        debug!(name = %list.name, codes = list.len(), "Registering code list");
        self.lists.insert(list.name.clone(), list);
    }

    /// Get a code list by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CodeList> {
        self.lists.get(name)
    }

    /// Validate a value against a named code list
    #[must_use]
    pub fn validate(&self, list_name: &str, value: &str) -> bool {
        // If list doesn't exist, assume valid
        self.get(list_name).is_none_or(|list| list.is_valid(value))
    }

    /// Number of registered lists
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether no list is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// List all registered code list names, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.lists.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl CodeSetLookup for CodeListRegistry {
    fn is_valid_code(&self, set_key: &str, value: &str) -> bool {
        let key = set_key.trim();
        key.is_empty() || self.validate(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_code() {
        let mut list = CodeList::new("states");
        list.add("TN");
        list.add("GA");

        assert!(list.is_valid("TN"));
        assert!(list.is_valid("GA"));
        assert!(!list.is_valid("XX"));
        assert!(!list.is_valid("tn"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_case_sensitivity() {
        let list = CodeList::with_codes("states", vec!["TN", "GA"]).case_sensitive(false);
        assert!(list.is_valid("tn"));
        assert!(list.is_valid("Ga"));
        assert!(!list.is_valid("AL"));
    }

    #[test]
    fn test_empty_codelist() {
        let empty = CodeList::new("empty");
        assert!(empty.is_empty());
        assert!(!empty.is_valid("ANY"));
    }

    #[test]
    fn test_registry_lookup_fails_open() {
        let mut registry = CodeListRegistry::new();
        registry.register(CodeList::with_codes("pos", vec!["11", "21", "22"]));

        assert!(registry.is_valid_code("pos", "11"));
        assert!(!registry.is_valid_code("pos", "99"));
        // Unknown and empty keys are unconstrained
        assert!(registry.is_valid_code("taxonomy", "ANYTHING"));
        assert!(registry.is_valid_code("", "ANYTHING"));
        assert!(registry.is_valid_code("  ", "ANYTHING"));
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.is_valid_code("states", "ZZ"));
    }

    #[test]
    fn test_from_json() {
        let registry = CodeListRegistry::from_json(
            r#"{
                "states": ["TN", "GA"],
                "pos": { "codes": ["11", "21"], "description": "Place of service" },
                "units": { "codes": ["UN", "MJ"], "case_sensitive": false }
            }"#,
        )
        .unwrap();

        assert_eq!(registry.list_names(), vec!["pos", "states", "units"]);
        assert!(registry.validate("states", "GA"));
        assert_eq!(
            registry.get("pos").and_then(|l| l.description.as_deref()),
            Some("Place of service")
        );
        assert!(registry.validate("units", "mj"));
    }

    #[test]
    fn test_from_yaml() {
        let registry = CodeListRegistry::from_yaml(
            "states:\n  - TN\n  - GA\nrelationship:\n  codes: ['18', '01']\n",
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.validate("relationship", "18"));
        assert!(!registry.validate("relationship", "19"));
    }

    #[test]
    fn test_malformed_content() {
        assert!(matches!(
            CodeListRegistry::from_json("{ \"states\": 5 }"),
            Err(Error::CodeList(_))
        ));
        assert!(CodeListRegistry::from_yaml("states: [").is_err());
    }
}
