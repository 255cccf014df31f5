//! Concurrent cache of compiled maps

use crate::model::Map;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe registry of compiled maps keyed by identifier
///
/// Maps are handed out as `Arc<Map>` so validations running on different
/// threads share one immutable arena.
pub struct MapRegistry {
    maps: DashMap<String, Arc<Map>>,
}

impl MapRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            maps: DashMap::new(),
        }
    }

    /// Register (or replace) a map
    pub fn register(&self, name: impl Into<String>, map: Arc<Map>) {
        self.maps.insert(name.into(), map);
    }

    /// Get a map by identifier
    pub fn get(&self, name: &str) -> Option<Arc<Map>> {
        self.maps.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a map is cached
    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Drop a cached map
    pub fn remove(&self, name: &str) -> Option<Arc<Map>> {
        self.maps.remove(name).map(|(_, map)| map)
    }

    /// Number of cached maps
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeSpec;
    use std::thread;

    fn tiny(id: &str) -> Arc<Map> {
        Arc::new(Map::compile(NodeSpec::root(id, "tiny")).unwrap())
    }

    #[test]
    fn test_register_and_get() {
        let registry = MapRegistry::new();
        assert!(registry.is_empty());

        registry.register("835", tiny("835"));
        assert!(registry.contains("835"));
        assert_eq!(registry.get("835").unwrap().id(), "835");
        assert!(registry.get("837").is_none());

        assert!(registry.remove("835").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(MapRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register(format!("map{i}"), tiny("shared")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 4);
    }
}
