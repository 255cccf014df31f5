#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-ir
//!
//! Intermediate Representation for X12 interchanges.
//!
//! This crate holds the per-run data shared by the reader, the validator and
//! the reporters: raw segment tokens, the parse tree bound to a compiled map,
//! and the violations collected while building it.

/// Parse tree container and run-level metadata.
pub mod document;
/// Source positions and violations.
pub mod metadata;
/// Parse tree nodes bound to compiled map nodes.
pub mod node;
/// Raw segment tokens produced by the envelope reader.
pub mod token;
/// Depth-first walks over parse trees.
pub mod traversal;

/// Primary parse tree type.
pub use document::{ParseTree, TreeMetadata};
/// Positions and violations accumulated during validation.
pub use metadata::{Position, Violation, ViolationClass, ViolationKind};
/// Node primitives for the parse tree.
pub use node::{NodeId, NodeType, Outcome, ParseNode};
/// Tokens emitted by the envelope reader.
pub use token::{Field, SegmentToken};
/// Visitor entry points.
pub use traversal::{Traversal, violations, walk};
