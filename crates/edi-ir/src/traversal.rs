//! Depth-first walks over a parse tree
//!
//! A [`Traversal`] borrows nodes for the whole walk, so visitors can keep
//! references to the nodes and violations they collect.

use crate::metadata::Violation;
use crate::node::ParseNode;

/// Visitor driven by [`walk`]
pub trait Traversal<'t> {
    /// Visit a node; `path` holds the ids of its ancestors, root first
    fn visit(&mut self, node: &'t ParseNode, path: &[&'t str]);

    /// Called before the children of a node are walked
    fn enter(&mut self, _node: &'t ParseNode, _path: &[&'t str]) {}

    /// Called after the children of a node were walked
    fn leave(&mut self, _node: &'t ParseNode, _path: &[&'t str]) {}

    /// Returning false stops the walk before the next visit
    fn should_continue(&self) -> bool {
        true
    }
}

/// Walk a subtree in pre-order
pub fn walk<'t, T: Traversal<'t>>(node: &'t ParseNode, visitor: &mut T) {
    let mut path = Vec::new();
    walk_node(node, visitor, &mut path);
}

fn walk_node<'t, T: Traversal<'t>>(
    node: &'t ParseNode,
    visitor: &mut T,
    path: &mut Vec<&'t str>,
) {
    if !visitor.should_continue() {
        return;
    }

    visitor.visit(node, path);

    if !node.children.is_empty() {
        visitor.enter(node, path);
        path.push(node.id.as_str());

        for child in &node.children {
            walk_node(child, visitor, path);
        }

        path.pop();
        visitor.leave(node, path);
    }
}

/// Every violation in a subtree, each node's own before its children's
pub fn violations(node: &ParseNode) -> Vec<&Violation> {
    struct Collect<'t>(Vec<&'t Violation>);

    impl<'t> Traversal<'t> for Collect<'t> {
        fn visit(&mut self, node: &'t ParseNode, _path: &[&'t str]) {
            self.0.extend(node.violations.iter());
        }
    }

    let mut collect = Collect(Vec::new());
    walk(node, &mut collect);
    collect.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Position, ViolationKind};
    use crate::node::{NodeId, NodeType};

    fn seg(id: &str) -> ParseNode {
        ParseNode::new(NodeId(1), id, NodeType::Segment)
    }

    fn lp(id: &str) -> ParseNode {
        ParseNode::new(NodeId(2), id, NodeType::Loop)
    }

    fn provider_loop() -> ParseNode {
        let mut root = ParseNode::new(NodeId::ROOT, "837", NodeType::Root);
        let mut provider = lp("2000A");
        provider.add_child(seg("HL"));
        provider.add_child(seg("PRV"));
        root.add_child(provider);
        root
    }

    #[derive(Default)]
    struct Recorder {
        visited: Vec<String>,
        entered: Vec<String>,
        left: Vec<String>,
        limit: Option<usize>,
    }

    impl<'t> Traversal<'t> for Recorder {
        fn visit(&mut self, node: &'t ParseNode, path: &[&'t str]) {
            let mut full = path.to_vec();
            full.push(&node.id);
            self.visited.push(full.join("/"));
        }

        fn enter(&mut self, node: &'t ParseNode, _path: &[&'t str]) {
            self.entered.push(node.id.clone());
        }

        fn leave(&mut self, node: &'t ParseNode, _path: &[&'t str]) {
            self.left.push(node.id.clone());
        }

        fn should_continue(&self) -> bool {
            self.limit.is_none_or(|limit| self.visited.len() < limit)
        }
    }

    #[test]
    fn test_walk_order_and_paths() {
        let root = provider_loop();
        let mut recorder = Recorder::default();
        walk(&root, &mut recorder);

        assert_eq!(
            recorder.visited,
            vec!["837", "837/2000A", "837/2000A/HL", "837/2000A/PRV"]
        );
        assert_eq!(recorder.entered, vec!["837", "2000A"]);
        assert_eq!(recorder.left, vec!["2000A", "837"]);
    }

    #[test]
    fn test_walk_stops_early() {
        let root = provider_loop();
        let mut recorder = Recorder {
            limit: Some(2),
            ..Recorder::default()
        };
        walk(&root, &mut recorder);
        assert_eq!(recorder.visited, vec!["837", "837/2000A"]);
    }

    #[test]
    fn test_violations_in_tree_order() {
        let finding = |id: &str, kind| Violation::new(id, Position::new(1, 0), kind, "x");
        let mut hl = seg("HL");
        hl.add_violation(finding("HL03", ViolationKind::InvalidCode));
        let mut provider = lp("2000A");
        provider.add_violation(finding("PRV", ViolationKind::MissingSegment));
        provider.add_child(hl);
        let mut root = ParseNode::new(NodeId::ROOT, "837", NodeType::Root);
        root.add_child(provider);

        let ids: Vec<&str> = violations(&root)
            .into_iter()
            .map(|v| v.node_id.as_str())
            .collect();
        assert_eq!(ids, vec!["PRV", "HL03"]);
        assert!(violations(&seg("BHT")).is_empty());
    }
}
