//! Parse tree nodes

use crate::metadata::{Position, Violation};
use serde::{Deserialize, Serialize};

/// Index of a node inside a compiled map arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The root node of every compiled map
    pub const ROOT: NodeId = NodeId(0);

    /// Arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// Types of nodes shared by the map and the parse tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Root of the map
    Root,

    /// Repeatable bundle of segments
    Loop,

    /// Delimited line identified by its code
    Segment,

    /// Field bundling sub-elements
    Composite,

    /// Simple data element
    Element,
}

/// A node in the parse tree, bound to one map node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseNode {
    /// Map node this instance is bound to
    pub schema: NodeId,

    /// Map node id (loop id, segment code, element reference)
    pub id: String,

    /// Node type
    pub node_type: NodeType,

    /// Zero-based occurrence index among consecutive repeats
    pub occurrence: usize,

    /// Source position (absent for the root)
    pub position: Option<Position>,

    /// Raw value (elements only)
    pub value: Option<String>,

    /// Child nodes
    pub children: Vec<ParseNode>,

    /// Violations raised against this node
    pub violations: Vec<Violation>,
}

/// Outcome of validating a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    Ok,
    Violations(&'a [Violation]),
}

impl ParseNode {
    /// Create a new node
    pub fn new(schema: NodeId, id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            schema,
            id: id.into(),
            node_type,
            occurrence: 0,
            position: None,
            value: None,
            children: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Create an element node carrying a raw value
    pub fn element(schema: NodeId, id: impl Into<String>, value: impl Into<String>) -> Self {
        let mut node = Self::new(schema, id, NodeType::Element);
        node.value = Some(value.into());
        node
    }

    /// Set the occurrence index
    #[must_use]
    pub fn with_occurrence(mut self, occurrence: usize) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Set the source position
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Add a child node
    pub fn add_child(&mut self, child: ParseNode) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Record a violation against this node
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Ok when no violation was raised against this node itself
    pub fn outcome(&self) -> Outcome<'_> {
        if self.violations.is_empty() {
            Outcome::Ok
        } else {
            Outcome::Violations(&self.violations)
        }
    }

    /// Find the first child with the given id
    pub fn find_child(&self, id: &str) -> Option<&ParseNode> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Find all children with the given id
    pub fn find_children(&self, id: &str) -> Vec<&ParseNode> {
        self.children.iter().filter(|c| c.id == id).collect()
    }

    /// Count of segment nodes in this subtree
    pub fn segment_count(&self) -> usize {
        let own = usize::from(self.node_type == NodeType::Segment);
        own + self
            .children
            .iter()
            .map(ParseNode::segment_count)
            .sum::<usize>()
    }
}
