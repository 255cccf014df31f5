//! # edi-schema
//!
//! Compiled X12 maps: the immutable node arena, its JSON/YAML loader, the
//! map cache and the version index used to pick a map for an interchange.

pub mod index;
pub mod loader;
pub mod model;
pub mod registry;

pub use index::{MapIndex, MapIndexEntry};
pub use loader::MapLoader;
pub use model::{DataType, ElementSpec, Map, NodeKind, NodeSpec, Repeat, SchemaNode, Usage};
pub use registry::MapRegistry;

pub use edi_ir::NodeId;

use thiserror::Error;

/// Errors that can occur when loading maps
#[derive(Error, Debug)]
pub enum Error {
    #[error("Map not found: {0}")]
    NotFound(String),

    #[error("Invalid map format: {0}")]
    InvalidFormat(String),

    #[error("Invalid map: {0}")]
    InvalidMap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
