//! X12 syntax definitions and delimiter handling
//!
//! X12 has no service string advice. The delimiters are carried by the ISA
//! segment itself, which is fixed width:
//!
//! ```text
//! ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *...*:~
//!    ^ offset 3: element delimiter                    offset 104 ^ ^ offset 105
//!                                          sub-element delimiter   segment terminator
//! ```

use crate::{Error, Result};

/// Length of the ISA segment including its terminator
pub const ISA_LENGTH: usize = 106;

/// Offset of the element delimiter inside the ISA segment
pub const ELEMENT_OFFSET: usize = 3;

/// Offset of the sub-element delimiter (ISA16)
pub const SUB_ELEMENT_OFFSET: usize = 104;

/// Offset of the segment terminator
pub const SEGMENT_OFFSET: usize = 105;

/// Delimiters used for splitting an interchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    /// Element delimiter (commonly '*')
    pub element: u8,
    /// Sub-element delimiter (commonly ':' or '>')
    pub sub_element: u8,
    /// Segment terminator (commonly '~')
    pub segment: u8,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            element: b'*',
            sub_element: b':',
            segment: b'~',
        }
    }
}

impl Delimiters {
    /// Sniff the delimiters from the leading ISA record
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] when the data does not start with `ISA`,
    /// is shorter than [`ISA_LENGTH`], or the delimiters are unusable.
    pub fn from_isa(header: &[u8]) -> Result<Self> {
        if !header.starts_with(b"ISA") {
            let found = String::from_utf8_lossy(&header[..header.len().min(3)]).into_owned();
            return Err(Error::Format(format!(
                "interchange does not begin with 'ISA': found '{found}'"
            )));
        }
        if header.len() < ISA_LENGTH {
            return Err(Error::Format(format!(
                "ISA segment is only {} characters, expected {ISA_LENGTH}",
                header.len()
            )));
        }

        let delimiters = Self {
            element: header[ELEMENT_OFFSET],
            sub_element: header[SUB_ELEMENT_OFFSET],
            segment: header[SEGMENT_OFFSET],
        };
        delimiters.check()?;
        Ok(delimiters)
    }

    fn check(&self) -> Result<()> {
        for (name, byte) in [
            ("element delimiter", self.element),
            ("sub-element delimiter", self.sub_element),
            ("segment terminator", self.segment),
        ] {
            if byte.is_ascii_alphanumeric() {
                return Err(Error::Format(format!(
                    "{name} '{}' is alphanumeric",
                    char::from(byte)
                )));
            }
        }
        if self.element == self.segment
            || self.element == self.sub_element
            || self.sub_element == self.segment
        {
            return Err(Error::Format("ISA delimiters must be distinct".to_string()));
        }
        Ok(())
    }

    /// Check if a byte is one of the delimiters
    pub fn is_delimiter(&self, byte: u8) -> bool {
        byte == self.element || byte == self.sub_element || byte == self.segment
    }
}

/// A buffer for walking an interchange one segment at a time
pub struct SyntaxBuffer<'a> {
    /// The underlying data buffer
    pub data: &'a [u8],
    /// Current position in the buffer
    pub pos: usize,
    /// The delimiters used for splitting
    pub delimiters: Delimiters,
}

impl<'a> SyntaxBuffer<'a> {
    /// Create a new syntax buffer with the given delimiters
    pub fn new(data: &'a [u8], delimiters: Delimiters) -> Self {
        Self {
            data,
            pos: 0,
            delimiters,
        }
    }

    /// Check if we've reached the end
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skip line breaks and other whitespace between segments
    pub fn skip_noise(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if b.is_ascii_whitespace() && b != self.delimiters.segment {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Read up to the next segment terminator
    ///
    /// Returns the byte offset of the segment and its bytes without the
    /// terminator. Stray terminators yield empty slices, which callers skip.
    pub fn next_segment(&mut self) -> Option<(usize, &'a [u8])> {
        self.skip_noise();
        if self.is_empty() {
            return None;
        }

        let start = self.pos;
        let data: &'a [u8] = self.data;
        let end = data[start..]
            .iter()
            .position(|&b| b == self.delimiters.segment)
            .map_or(data.len(), |idx| start + idx);
        self.pos = (end + 1).min(data.len());

        let mut segment = &data[start..end];
        while let [rest @ .., b'\r' | b'\n'] = segment {
            segment = rest;
        }
        Some((start, segment))
    }
}
