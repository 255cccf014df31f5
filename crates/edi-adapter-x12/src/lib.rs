//! # edi-adapter-x12
//!
//! ANSI X12 reader and envelope handling.
//!
//! The reader sniffs the delimiters from the fixed-width ISA header and
//! splits the rest of the interchange into segment tokens. The envelope
//! tracker checks the ISA/IEA, GS/GE and ST/SE control pairs.

pub mod envelopes;
pub mod reader;
pub mod syntax;

pub use envelopes::{EnvelopeTracker, GroupHeader, InterchangeHeader};
pub use reader::{EnvelopeReader, TokenStream, read_all};
pub use syntax::Delimiters;

use thiserror::Error;

/// Errors that can occur when reading X12
#[derive(Error, Debug)]
pub enum Error {
    #[error("Format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
