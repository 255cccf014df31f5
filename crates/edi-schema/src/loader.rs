//! Map loader
//!
//! Maps are stored as JSON or YAML node trees and compiled into an arena
//! [`Map`] on load. Compiled maps are cached in a [`MapRegistry`].

use crate::index::{INDEX_FILE, MapIndex};
use crate::model::{DataType, ElementSpec, Map, NodeSpec, Repeat, Usage};
use crate::registry::MapRegistry;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Serializable map format for loading from files
#[derive(Debug, Deserialize)]
struct MapFile {
    id: String,
    name: String,
    #[serde(default)]
    children: Vec<NodeFile>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum NodeFile {
    Loop {
        id: String,
        name: String,
        #[serde(default)]
        usage: Option<String>,
        #[serde(default)]
        repeat: Option<RepeatFile>,
        #[serde(default)]
        children: Vec<NodeFile>,
    },
    Segment {
        id: String,
        name: String,
        #[serde(default)]
        usage: Option<String>,
        #[serde(default)]
        repeat: Option<RepeatFile>,
        #[serde(default)]
        children: Vec<NodeFile>,
    },
    Composite {
        id: String,
        name: String,
        #[serde(default)]
        usage: Option<String>,
        #[serde(default)]
        children: Vec<NodeFile>,
    },
    Element {
        id: String,
        name: String,
        #[serde(default)]
        usage: Option<String>,
        data_type: String,
        #[serde(default = "default_min_len")]
        min_len: usize,
        max_len: usize,
        #[serde(default)]
        valid_codes: Vec<String>,
        #[serde(default)]
        external_codes: Option<String>,
        #[serde(default)]
        qualifier: bool,
    },
}

/// Repeat counts are either a number or a marker such as `">1"`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RepeatFile {
    Count(usize),
    Text(String),
}

fn default_min_len() -> usize {
    1
}

fn parse_usage(usage: Option<&str>, id: &str) -> Result<Usage> {
    match usage.map(str::trim) {
        None => Ok(Usage::Situational),
        Some(u) if u.eq_ignore_ascii_case("R") || u.eq_ignore_ascii_case("required") => {
            Ok(Usage::Required)
        }
        // Not-used nodes are accepted on load and never demanded
        Some(u)
            if u.eq_ignore_ascii_case("S")
                || u.eq_ignore_ascii_case("situational")
                || u.eq_ignore_ascii_case("N") =>
        {
            Ok(Usage::Situational)
        }
        Some(other) => Err(Error::InvalidMap(format!(
            "node {id} has unknown usage '{other}'"
        ))),
    }
}

fn parse_repeat(repeat: Option<RepeatFile>, id: &str) -> Result<Repeat> {
    match repeat {
        None => Ok(Repeat::default()),
        Some(RepeatFile::Count(0)) => Err(Error::InvalidMap(format!(
            "node {id} has a max repeat of 0"
        ))),
        Some(RepeatFile::Count(n)) => Ok(Repeat::Bounded(n)),
        Some(RepeatFile::Text(text)) => {
            let text = text.trim();
            if text == ">1" || text == "*" || text.eq_ignore_ascii_case("unbounded") {
                Ok(Repeat::Unbounded)
            } else {
                match text.parse::<usize>() {
                    Ok(n) if n > 0 => Ok(Repeat::Bounded(n)),
                    _ => Err(Error::InvalidMap(format!(
                        "node {id} has invalid max repeat '{text}'"
                    ))),
                }
            }
        }
    }
}

fn convert_children(children: Vec<NodeFile>) -> Result<Vec<NodeSpec>> {
    children.into_iter().map(convert_node).collect()
}

fn convert_node(node: NodeFile) -> Result<NodeSpec> {
    let spec = match node {
        NodeFile::Loop {
            id,
            name,
            usage,
            repeat,
            children,
        } => {
            let usage = parse_usage(usage.as_deref(), &id)?;
            let repeat = parse_repeat(repeat, &id)?;
            NodeSpec::loop_node(id, name)
                .usage(usage)
                .repeat(repeat)
                .children(convert_children(children)?)
        }
        NodeFile::Segment {
            id,
            name,
            usage,
            repeat,
            children,
        } => {
            let usage = parse_usage(usage.as_deref(), &id)?;
            let repeat = parse_repeat(repeat, &id)?;
            NodeSpec::segment(id, name)
                .usage(usage)
                .repeat(repeat)
                .children(convert_children(children)?)
        }
        NodeFile::Composite {
            id,
            name,
            usage,
            children,
        } => {
            let usage = parse_usage(usage.as_deref(), &id)?;
            NodeSpec::composite(id, name)
                .usage(usage)
                .children(convert_children(children)?)
        }
        NodeFile::Element {
            id,
            name,
            usage,
            data_type,
            min_len,
            max_len,
            valid_codes,
            external_codes,
            qualifier,
        } => {
            let usage = parse_usage(usage.as_deref(), &id)?;
            let data_type: DataType = data_type
                .parse()
                .map_err(|e| Error::InvalidMap(format!("element {id}: {e}")))?;
            let mut element = ElementSpec::new(data_type, min_len, max_len).with_codes(valid_codes);
            if let Some(key) = external_codes.filter(|k| !k.trim().is_empty()) {
                element = element.with_external(key);
            }
            if qualifier {
                element = element.as_qualifier();
            }
            NodeSpec::element(id, name, element).usage(usage)
        }
    };
    Ok(spec)
}

/// Loads maps from search paths and caches the compiled result
pub struct MapLoader {
    registry: Arc<MapRegistry>,
    map_paths: Vec<PathBuf>,
    force_reload: bool,
}

impl MapLoader {
    /// Create a new map loader with the given search paths
    pub fn new(map_paths: Vec<PathBuf>) -> Self {
        Self {
            registry: Arc::new(MapRegistry::new()),
            map_paths,
            force_reload: false,
        }
    }

    /// Create a new map loader sharing a pre-configured registry
    pub fn with_registry(registry: Arc<MapRegistry>, map_paths: Vec<PathBuf>) -> Self {
        Self {
            registry,
            map_paths,
            force_reload: false,
        }
    }

    /// Bypass the cache on every load (the fresh map still replaces the cached one)
    #[must_use]
    pub fn force_reload(mut self, force: bool) -> Self {
        self.force_reload = force;
        self
    }

    /// Load a compiled map by identifier
    ///
    /// The identifier is either a path to a map file or a name resolved in
    /// the search paths as `<id>`, `<id>.json`, `<id>.yaml` or `<id>.yml`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no file resolves, and
    /// [`Error::InvalidFormat`] or [`Error::InvalidMap`] when it cannot be
    /// compiled.
    pub fn load_map(&self, identifier: &str) -> Result<Arc<Map>> {
        if !self.force_reload {
            if let Some(cached) = self.registry.get(identifier) {
                debug!("Cache hit for map: {}", identifier);
                return Ok(cached);
            }
        }

        trace!("Loading map from disk: {}", identifier);
        let path = self.resolve(identifier)?;
        let map = Arc::new(self.load_from_file(&path)?);
        info!(
            "Loaded map {} ({} nodes) from {}",
            map.id(),
            map.len(),
            path.display()
        );

        self.registry.register(identifier, Arc::clone(&map));
        Ok(map)
    }

    /// Load the map registered in the search paths' index for an interchange
    /// version, functional identifier code and version/release code
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no index or no matching entry exists.
    pub fn load_for(&self, icvn: &str, fic: &str, vriic: &str) -> Result<Arc<Map>> {
        let index = self.load_index()?;
        let file = index.resolve(icvn, fic, vriic).ok_or_else(|| {
            Error::NotFound(format!(
                "no map registered for version {icvn}, group {fic}, release {vriic}"
            ))
        })?;
        self.load_map(file)
    }

    /// Load the first map index found in the search paths
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no search path holds an index file.
    pub fn load_index(&self) -> Result<MapIndex> {
        for dir in &self.map_paths {
            let candidate = dir.join(INDEX_FILE);
            if candidate.is_file() {
                trace!("Found map index: {:?}", candidate);
                return MapIndex::from_file(&candidate);
            }
        }
        Err(Error::NotFound(format!(
            "{INDEX_FILE} not found in search paths: {:?}",
            self.map_paths
        )))
    }

    /// Load and compile a map from a specific file path
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed or compiled.
    pub fn load_from_file(&self, path: &Path) -> Result<Map> {
        trace!("Loading map from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;

        if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            self.load_from_yaml(&content)
        } else {
            self.load_from_json(&content)
        }
    }

    /// Compile a map from a JSON string
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON is malformed or the map breaks a rule.
    pub fn load_from_json(&self, json: &str) -> Result<Map> {
        let map_file: MapFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidFormat(format!("JSON parse error: {e}")))?;
        Self::compile(map_file)
    }

    /// Compile a map from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error when the YAML is malformed or the map breaks a rule.
    pub fn load_from_yaml(&self, yaml: &str) -> Result<Map> {
        let map_file: MapFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidFormat(format!("YAML parse error: {e}")))?;
        Self::compile(map_file)
    }

    fn compile(map_file: MapFile) -> Result<Map> {
        let root = NodeSpec::root(map_file.id, map_file.name)
            .children(convert_children(map_file.children)?);
        Map::compile(root)
    }

    fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(identifier);
        if direct.is_file() {
            return Ok(direct);
        }

        let variations = [
            identifier.to_string(),
            format!("{identifier}.json"),
            format!("{identifier}.yaml"),
            format!("{identifier}.yml"),
        ];

        for dir in &self.map_paths {
            for variation in &variations {
                let file_path = dir.join(variation);
                if file_path.is_file() {
                    trace!("Found map file: {:?}", file_path);
                    return Ok(file_path);
                }
            }
        }

        Err(Error::NotFound(format!(
            "Map {} not found in search paths: {:?}",
            identifier, self.map_paths
        )))
    }

    /// Add a search path for map files
    pub fn add_path(&mut self, path: PathBuf) {
        self.map_paths.push(path);
    }

    /// Get the registry (for testing/debugging)
    pub fn registry(&self) -> &MapRegistry {
        &self.registry
    }
}

impl Default for MapLoader {
    fn default() -> Self {
        Self::new(vec![PathBuf::from(".")])
    }
}
