//! # edi-adapter-sql
//!
//! Relational layout for X12 maps.
//!
//! [`emit`] walks a compiled map and lays its loops, repeating segments
//! and elements out as tables and columns. [`ddl`] turns that layout into
//! T-SQL `CREATE TABLE` batches.

pub mod ddl;
pub mod emitter;

pub use ddl::{create_table, render};
pub use emitter::{ColumnDef, RelationalSchemaEmitter, SqlType, TableDef, TableSource, emit};

use edi_schema::MapLoader;
use thiserror::Error;

/// Errors that can occur when producing DDL
#[derive(Error, Debug)]
pub enum Error {
    #[error("Map error: {0}")]
    Map(#[from] edi_schema::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Load a map and render its DDL
///
/// # Errors
///
/// Returns [`Error::Map`] when the map cannot be loaded.
pub fn ddl_for_map(loader: &MapLoader, identifier: &str) -> Result<String> {
    let map = loader.load_map(identifier)?;
    Ok(render(&emit(&map)))
}
