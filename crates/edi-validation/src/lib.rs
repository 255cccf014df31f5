#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # edi-validation
//!
//! Validation of X12 interchanges against compiled maps.
//!
//! The engine binds each segment token to a map node, builds a parse tree
//! and records every structural and data violation on the node it concerns.
//! Element values are checked by the data type validator; codes that live
//! outside the map are resolved through a code-set lookup.
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use edi_schema::{DataType, ElementSpec, Map, NodeSpec};
//! use edi_validation::{InterchangeValidator, ValidationConfig};
//! use edi_ir::{Field, Position, SegmentToken};
//!
//! let segment = NodeSpec::segment("BHT", "Beginning of hierarchical transaction")
//!     .required()
//!     .child(NodeSpec::element("BHT01", "Structure code", ElementSpec::new(DataType::Identifier, 4, 4)).required());
//! let map = Arc::new(Map::compile(NodeSpec::root("TEST", "Test").child(segment)).unwrap());
//!
//! let token = SegmentToken::new("BHT", vec![Field::Simple("0019".into())], Position::new(1, 0));
//! let outcome = InterchangeValidator::new(map, ValidationConfig::default())
//!     .unwrap()
//!     .validate([token]);
//! assert!(outcome.is_valid());
//! ```

pub mod codelist;
pub mod engine;
pub mod reporter;
pub mod rules;

// Re-export main types
pub use codelist::{AcceptAll, CodeList, CodeListRegistry, CodeSetLookup};
pub use engine::{InterchangeValidator, ValidationConfig, ValidationOutcome, ValidatorState};
pub use reporter::{Format, Report, ReportLine, ReportSummary};
pub use rules::{Charset, DataTypeValidator, Finding, validate_date, validate_length, validate_time};

use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during validation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Code list error: {0}")]
    CodeList(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Read error: {0}")]
    Read(#[from] edi_adapter_x12::Error),

    #[error("Unknown report format: {0}")]
    UnknownFormat(String),

    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read and validate an interchange held in memory
///
/// # Errors
///
/// Returns [`Error::Read`] when the data is not an X12 interchange. Content
/// problems are reported as violations in the outcome, not as errors.
pub fn validate_bytes(
    map: Arc<edi_schema::Map>,
    data: &[u8],
    config: ValidationConfig,
) -> Result<ValidationOutcome> {
    let tokens = edi_adapter_x12::EnvelopeReader::from_bytes(data)?;
    Ok(InterchangeValidator::new(map, config)?.validate(tokens))
}
