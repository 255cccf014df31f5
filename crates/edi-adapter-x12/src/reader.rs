//! X12 segment reader
//!
//! The whole interchange is read into memory, the delimiters are sniffed
//! from the ISA header and segments are then handed out one token at a time.

use crate::syntax::{Delimiters, SyntaxBuffer};
use crate::Result;
use edi_ir::{Field, Position, SegmentToken};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, trace};

/// Entry point for reading an X12 interchange
pub struct EnvelopeReader;

impl EnvelopeReader {
    /// Read an interchange from a byte stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`](crate::Error::Format) when the stream does not start with a
    /// complete ISA segment, and [`Error::Io`](crate::Error::Io) when reading fails.
    pub fn open<R: Read>(mut reader: R) -> Result<TokenStream> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Read an interchange from a file
    ///
    /// # Errors
    ///
    /// See [`EnvelopeReader::open`].
    pub fn open_path(path: impl AsRef<Path>) -> Result<TokenStream> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening interchange");
        Self::open(BufReader::new(File::open(path)?))
    }

    /// Read an interchange already held in memory
    ///
    /// # Errors
    ///
    /// See [`EnvelopeReader::open`].
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<TokenStream> {
        let data = data.into();
        let start = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(data.len());
        let delimiters = Delimiters::from_isa(&data[start..])?;
        debug!(
            element = %char::from(delimiters.element),
            sub_element = %char::from(delimiters.sub_element),
            segment = ?char::from(delimiters.segment),
            "Sniffed delimiters"
        );
        Ok(TokenStream {
            data,
            pos: start,
            ordinal: 0,
            delimiters,
        })
    }
}

/// Iterator over the segment tokens of one interchange
#[derive(Debug)]
pub struct TokenStream {
    data: Vec<u8>,
    pos: usize,
    ordinal: usize,
    delimiters: Delimiters,
}

impl TokenStream {
    /// Delimiters sniffed from the ISA header
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// Segment terminator
    pub fn segment_terminator(&self) -> u8 {
        self.delimiters.segment
    }

    /// Element delimiter
    pub fn element_delimiter(&self) -> u8 {
        self.delimiters.element
    }

    /// Sub-element delimiter
    pub fn sub_element_delimiter(&self) -> u8 {
        self.delimiters.sub_element
    }

    /// Number of tokens handed out so far
    pub fn segments_read(&self) -> usize {
        self.ordinal
    }

    fn tokenize(&self, offset: usize, raw: &[u8], ordinal: usize) -> SegmentToken {
        // Split before decoding so delimiters above 0x7F still match
        let Delimiters {
            element,
            sub_element,
            ..
        } = self.delimiters;
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();

        let mut pieces = raw.split(move |&b| b == element);
        let code = pieces
            .next()
            .map(|c| text(c).trim().to_string())
            .unwrap_or_default();
        // ISA16 is the sub-element delimiter itself
        let split_components = code != "ISA";

        let fields = pieces
            .map(|piece| {
                if split_components && piece.contains(&sub_element) {
                    Field::Composite(piece.split(|&b| b == sub_element).map(text).collect())
                } else {
                    Field::Simple(text(piece))
                }
            })
            .collect();

        SegmentToken::new(code, fields, Position::new(ordinal, offset))
    }
}

impl Iterator for TokenStream {
    type Item = SegmentToken;

    fn next(&mut self) -> Option<SegmentToken> {
        loop {
            let (offset, raw) = {
                let mut buffer = SyntaxBuffer::new(&self.data, self.delimiters);
                buffer.pos = self.pos;
                let next = buffer.next_segment();
                self.pos = buffer.pos;
                next?
            };
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.ordinal += 1;
            let token = self.tokenize(offset, raw, self.ordinal);
            trace!(code = %token.code, segment = self.ordinal, "Read segment");
            return Some(token);
        }
    }
}

/// Read every token of an interchange held in memory
///
/// # Errors
///
/// See [`EnvelopeReader::open`].
pub fn read_all(data: &[u8]) -> Result<Vec<SegmentToken>> {
    Ok(EnvelopeReader::from_bytes(data)?.collect())
}
