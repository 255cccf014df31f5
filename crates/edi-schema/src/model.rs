//! Compiled map model
//!
//! A map is an arena of immutable [`SchemaNode`] values. The children of a
//! node occupy a contiguous index range and every node records its parent,
//! so traversals can ascend without back-pointers.

use crate::{Error, Result};
use edi_ir::{NodeId, NodeType, SegmentToken};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Whether a node must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Usage {
    Required,
    #[default]
    Situational,
}

/// Maximum number of consecutive occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Bounded(usize),
    Unbounded,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Bounded(1)
    }
}

impl Repeat {
    /// Whether one more occurrence is permitted after `count` occurrences
    pub fn allows_another(self, count: usize) -> bool {
        match self {
            Repeat::Bounded(max) => count < max,
            Repeat::Unbounded => true,
        }
    }

    /// Whether the node may occur at most once
    pub fn is_single(self) -> bool {
        self == Repeat::Bounded(1)
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repeat::Bounded(max) => write!(f, "{max}"),
            Repeat::Unbounded => f.write_str(">1"),
        }
    }
}

/// X12 primitive data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// `N`, `N0`..`N9`: integer with implied decimal places
    Numeric(u8),
    /// `R`: explicit decimal
    Decimal,
    /// `DT`: YYMMDD or CCYYMMDD
    Date,
    /// `TM`: HHMM[SS[d..]]
    Time,
    /// `AN`: string
    AlphaNumeric,
    /// `ID`: identifier drawn from a code set
    Identifier,
    /// `B`: binary
    Binary,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "N" => Ok(DataType::Numeric(0)),
            "R" => Ok(DataType::Decimal),
            "DT" => Ok(DataType::Date),
            "TM" => Ok(DataType::Time),
            "AN" => Ok(DataType::AlphaNumeric),
            "ID" => Ok(DataType::Identifier),
            "B" => Ok(DataType::Binary),
            other => match other.strip_prefix('N').map(str::parse::<u8>) {
                Some(Ok(decimals)) if decimals <= 9 => Ok(DataType::Numeric(decimals)),
                _ => Err(Error::InvalidMap(format!("unknown data type '{other}'"))),
            },
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Numeric(decimals) => write!(f, "N{decimals}"),
            DataType::Decimal => f.write_str("R"),
            DataType::Date => f.write_str("DT"),
            DataType::Time => f.write_str("TM"),
            DataType::AlphaNumeric => f.write_str("AN"),
            DataType::Identifier => f.write_str("ID"),
            DataType::Binary => f.write_str("B"),
        }
    }
}

/// Constraints of a simple element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    pub data_type: DataType,
    pub min_length: usize,
    pub max_length: usize,
    /// Permitted codes; empty means unconstrained
    pub valid_codes: Vec<String>,
    /// Key into the external code-set service
    pub external_codes: Option<String>,
    /// Whether the value takes part in deciding which segment node a token
    /// binds to (e.g. `HL03` or an `NM101` entity code)
    pub qualifier: bool,
}

impl ElementSpec {
    /// Create element constraints without code restrictions
    pub fn new(data_type: DataType, min_length: usize, max_length: usize) -> Self {
        Self {
            data_type,
            min_length,
            max_length,
            valid_codes: Vec::new(),
            external_codes: None,
            qualifier: false,
        }
    }

    /// Restrict the element to a list of codes
    #[must_use]
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Delegate code checks to an external code set
    #[must_use]
    pub fn with_external(mut self, key: impl Into<String>) -> Self {
        self.external_codes = Some(key.into());
        self
    }

    /// Mark the element as a segment qualifier
    #[must_use]
    pub fn as_qualifier(mut self) -> Self {
        self.qualifier = true;
        self
    }
}

/// Closed set of node kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Loop,
    Segment,
    Composite,
    Element(ElementSpec),
}

impl NodeKind {
    /// Shared node type tag
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Root => NodeType::Root,
            NodeKind::Loop => NodeType::Loop,
            NodeKind::Segment => NodeType::Segment,
            NodeKind::Composite => NodeType::Composite,
            NodeKind::Element(_) => NodeType::Element,
        }
    }
}

/// One immutable node of a compiled map
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub usage: Usage,
    /// 1-indexed ordinal among siblings
    pub position: usize,
    pub max_repeat: Repeat,
    parent: Option<NodeId>,
    children: Range<usize>,
}

impl SchemaNode {
    /// Parent node, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids in declared order
    pub fn child_ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + use<> {
        self.children.clone().map(NodeId)
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether the node is required
    pub fn is_required(&self) -> bool {
        self.usage == Usage::Required
    }

    /// Element constraints, for element nodes
    pub fn element(&self) -> Option<&ElementSpec> {
        match &self.kind {
            NodeKind::Element(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Uncompiled node description used to build a [`Map`]
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub usage: Usage,
    pub max_repeat: Repeat,
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    fn new(kind: NodeKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            usage: Usage::Situational,
            max_repeat: Repeat::default(),
            children: Vec::new(),
        }
    }

    pub fn root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Root, id, name).required()
    }

    pub fn loop_node(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Loop, id, name)
    }

    pub fn segment(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Segment, id, name)
    }

    pub fn composite(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Composite, id, name)
    }

    pub fn element(id: impl Into<String>, name: impl Into<String>, spec: ElementSpec) -> Self {
        Self::new(NodeKind::Element(spec), id, name)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.usage = Usage::Required;
        self
    }

    #[must_use]
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn repeat(mut self, max_repeat: Repeat) -> Self {
        self.max_repeat = max_repeat;
        self
    }

    #[must_use]
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A compiled, immutable map
#[derive(Debug, Clone)]
pub struct Map {
    nodes: Vec<SchemaNode>,
}

impl Map {
    /// Compile a node description tree into an arena
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMap`] when the tree breaks a nesting rule or an
    /// element has `min_length > max_length`.
    pub fn compile(root: NodeSpec) -> Result<Self> {
        if root.kind != NodeKind::Root {
            return Err(Error::InvalidMap(format!(
                "map '{}' must start with a root node",
                root.id
            )));
        }

        let mut nodes = Vec::new();
        let mut pending: VecDeque<(usize, Vec<NodeSpec>)> = VecDeque::new();

        let NodeSpec {
            id,
            name,
            kind,
            usage,
            max_repeat,
            children,
        } = root;
        nodes.push(SchemaNode {
            id,
            name,
            kind,
            usage,
            position: 0,
            max_repeat,
            parent: None,
            children: 0..0,
        });
        pending.push_back((0, children));

        // Breadth-first placement keeps every child list contiguous.
        while let Some((parent_idx, children)) = pending.pop_front() {
            check_children(&nodes[parent_idx], &children)?;
            let start = nodes.len();
            let mut grandchildren = Vec::with_capacity(children.len());
            for (ordinal, spec) in children.into_iter().enumerate() {
                if let NodeKind::Element(element) = &spec.kind {
                    if element.min_length > element.max_length {
                        return Err(Error::InvalidMap(format!(
                            "element {} has min length {} above max length {}",
                            spec.id, element.min_length, element.max_length
                        )));
                    }
                }
                let NodeSpec {
                    id,
                    name,
                    kind,
                    usage,
                    max_repeat,
                    children,
                } = spec;
                nodes.push(SchemaNode {
                    id,
                    name,
                    kind,
                    usage,
                    position: ordinal + 1,
                    max_repeat,
                    parent: Some(NodeId(parent_idx)),
                    children: 0..0,
                });
                grandchildren.push(children);
            }
            nodes[parent_idx].children = start..nodes.len();
            for (offset, children) in grandchildren.into_iter().enumerate() {
                pending.push_back((start + offset, children));
            }
        }

        Ok(Self { nodes })
    }

    /// Map identifier (the root's id)
    pub fn id(&self) -> &str {
        &self.nodes[0].id
    }

    /// Map name (the root's name)
    pub fn name(&self) -> &str {
        &self.nodes[0].name
    }

    /// The root node
    pub fn root(&self) -> &SchemaNode {
        &self.nodes[0]
    }

    /// Node by id
    ///
    /// # Panics
    ///
    /// Panics when `id` does not belong to this map.
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    /// Node by id, `None` when out of range
    pub fn get(&self, id: NodeId) -> Option<&SchemaNode> {
        self.nodes.get(id.index())
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the map has only its root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Children of a node with their ids
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &SchemaNode)> + '_ {
        self.node(id)
            .child_ids()
            .map(move |child| (child, self.node(child)))
    }

    /// Child at a 0-based ordinal
    pub fn child(&self, id: NodeId, ordinal: usize) -> Option<NodeId> {
        let range = &self.node(id).children;
        (ordinal < range.len()).then(|| NodeId(range.start + ordinal))
    }

    /// Nearest enclosing loop (or the root) of a node
    pub fn parent_loop(&self, id: NodeId) -> NodeId {
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            if matches!(self.node(parent).kind, NodeKind::Loop | NodeKind::Root) {
                return parent;
            }
            current = self.node(parent).parent;
        }
        NodeId::ROOT
    }

    /// Slash-separated ids from below the root down to the node
    pub fn path(&self, id: NodeId) -> String {
        let mut ids = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if node.kind == NodeKind::Root {
                break;
            }
            ids.push(node.id.as_str());
            current = node.parent;
        }
        ids.reverse();
        format!("/{}", ids.join("/"))
    }

    /// Depth-first pre-order walk over every node id
    pub fn pre_order(&self) -> PreOrder<'_> {
        PreOrder {
            map: self,
            stack: vec![NodeId::ROOT],
        }
    }

    /// First segment reached by descending through first children of a loop
    pub fn entry_segment(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            match self.node(current).kind {
                NodeKind::Segment => return Some(current),
                NodeKind::Loop | NodeKind::Root => current = self.child(current, 0)?,
                NodeKind::Composite | NodeKind::Element(_) => return None,
            }
        }
    }

    /// Whether a segment token can be bound to the segment node `id`
    ///
    /// The codes must agree. When `check_qualifiers` is set, every element
    /// marked as a qualifier must carry one of its listed codes; a segment
    /// without marked elements is qualified by its first element when that
    /// is an identifier with listed codes.
    pub fn segment_matches(
        &self,
        id: NodeId,
        token: &SegmentToken,
        check_qualifiers: bool,
    ) -> bool {
        let node = self.node(id);
        if node.kind != NodeKind::Segment || node.id != token.code {
            return false;
        }
        if !check_qualifiers {
            return true;
        }

        let elements: Vec<(usize, &ElementSpec)> = self
            .children(id)
            .filter_map(|(_, child)| child.element().map(|spec| (child.position, spec)))
            .collect();
        let marked: Vec<(usize, &ElementSpec)> = elements
            .iter()
            .copied()
            .filter(|(_, spec)| spec.qualifier)
            .collect();
        let qualifiers = if marked.is_empty() {
            elements
                .first()
                .copied()
                .filter(|(position, spec)| {
                    *position == 1
                        && spec.data_type == DataType::Identifier
                        && !spec.valid_codes.is_empty()
                })
                .into_iter()
                .collect()
        } else {
            marked
        };

        qualifiers.iter().all(|(position, spec)| {
            spec.valid_codes.is_empty()
                || spec
                    .valid_codes
                    .iter()
                    .any(|code| code == token.value(*position))
        })
    }
}

/// Pre-order iterator over a map
pub struct PreOrder<'m> {
    map: &'m Map,
    stack: Vec<NodeId>,
}

impl Iterator for PreOrder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.map.node(id).child_ids().rev());
        Some(id)
    }
}

fn check_children(parent: &SchemaNode, children: &[NodeSpec]) -> Result<()> {
    for child in children {
        let allowed = match parent.kind {
            NodeKind::Root | NodeKind::Loop => {
                matches!(child.kind, NodeKind::Loop | NodeKind::Segment)
            }
            NodeKind::Segment => matches!(child.kind, NodeKind::Composite | NodeKind::Element(_)),
            NodeKind::Composite => matches!(child.kind, NodeKind::Element(_)),
            NodeKind::Element(_) => false,
        };
        if !allowed {
            return Err(Error::InvalidMap(format!(
                "{:?} '{}' cannot contain {:?} '{}'",
                parent.kind.node_type(),
                parent.id,
                child.kind.node_type(),
                child.id
            )));
        }
    }
    if parent.kind == NodeKind::Loop && children.is_empty() {
        return Err(Error::InvalidMap(format!("loop '{}' is empty", parent.id)));
    }
    Ok(())
}
