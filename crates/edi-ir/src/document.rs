//! Parse tree container for one validation run
#![allow(clippy::must_use_candidate)] // Builder/constructor API intentionally omits pervasive #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent builder methods return Self for ergonomics.

use crate::metadata::Violation;
use crate::node::ParseNode;
use crate::traversal::{Traversal, violations, walk};
use serde::{Deserialize, Serialize};

/// The parse tree produced by validating one interchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseTree {
    /// Root node of the tree (bound to the map root)
    pub root: ParseNode,

    /// Run-level metadata
    pub metadata: TreeMetadata,
}

/// Metadata associated with a parse tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeMetadata {
    /// Source file path or identifier
    pub source: Option<String>,

    /// Map the tree was validated against
    pub map_id: Option<String>,

    /// Interchange control number (ISA13)
    pub interchange_control: Option<String>,

    /// Number of segment tokens read from the source
    pub segments_read: usize,

    /// Completion timestamp of the run
    pub validated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ParseTree {
    /// Create a new tree with the given root node
    pub fn new(root: ParseNode) -> Self {
        Self {
            root,
            metadata: TreeMetadata::default(),
        }
    }

    /// Create a new tree with metadata
    pub fn with_metadata(root: ParseNode, metadata: TreeMetadata) -> Self {
        Self { root, metadata }
    }

    /// Violations attached to nodes, in tree order
    pub fn node_violations(&self) -> Vec<&Violation> {
        violations(&self.root)
    }

    /// Number of segment nodes bound into the tree
    pub fn segment_count(&self) -> usize {
        self.root.segment_count()
    }

    /// Ids of the nodes on each root-to-node path, depth first
    pub fn paths(&self) -> Vec<String> {
        struct PathCollector(Vec<String>);
        impl<'t> Traversal<'t> for PathCollector {
            fn visit(&mut self, node: &'t ParseNode, path: &[&'t str]) {
                let mut full = path.to_vec();
                full.push(&node.id);
                self.0.push(full.join("/"));
            }
        }
        let mut collector = PathCollector(Vec::new());
        walk(&self.root, &mut collector);
        collector.0
    }
}
