//! Source positions and the violations collected during a validation run
#![allow(clippy::must_use_candidate)] // Constructor helpers are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent setters are designed for chaining.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a token inside an interchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Segment ordinal within the interchange (1-indexed, ISA is 1)
    pub segment: usize,

    /// Byte offset of the segment's first byte
    pub offset: usize,

    /// Element ordinal within the segment (1-indexed)
    pub element: Option<usize>,

    /// Component ordinal within a composite element (1-indexed)
    pub component: Option<usize>,
}

impl Position {
    /// Create a segment-level position
    pub fn new(segment: usize, offset: usize) -> Self {
        Self {
            segment,
            offset,
            element: None,
            component: None,
        }
    }

    /// Narrow the position to one element of the segment
    pub fn at_element(self, element: usize) -> Self {
        Self {
            element: Some(element),
            component: None,
            ..self
        }
    }

    /// Narrow the position to one component of a composite element
    pub fn at_component(self, component: usize) -> Self {
        Self {
            component: Some(component),
            ..self
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}", self.segment)?;
        if let Some(element) = self.element {
            write!(f, ", element {element}")?;
        }
        if let Some(component) = self.component {
            write!(f, ", component {component}")?;
        }
        Ok(())
    }
}

/// Broad class of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationClass {
    /// Nesting, ordering, repetition or envelope problems
    Structural,
    /// Element value problems
    Data,
}

/// Specific kind of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Segment matches no node on the open path
    UnexpectedSegment,
    /// Required segment never occurred inside its loop
    MissingSegment,
    /// Required loop never occurred inside its parent
    MissingLoop,
    /// Segment or loop occurred more often than its max repeat
    RepeatExceeded,
    /// Envelope trailer disagrees with its header or the counted content
    EnvelopeMismatch,
    /// Value shorter than the minimum length
    TooShort,
    /// Value longer than the maximum length
    TooLong,
    /// Value does not conform to its data type
    InvalidDataType,
    /// Value is not in the element's code set
    InvalidCode,
    /// Required element is empty or absent
    RequiredMissing,
    /// Segment or composite carries more fields than defined
    TooManyElements,
}

impl ViolationKind {
    /// Structural or data class of this kind
    pub fn class(self) -> ViolationClass {
        match self {
            Self::UnexpectedSegment
            | Self::MissingSegment
            | Self::MissingLoop
            | Self::RepeatExceeded
            | Self::EnvelopeMismatch => ViolationClass::Structural,
            Self::TooShort
            | Self::TooLong
            | Self::InvalidDataType
            | Self::InvalidCode
            | Self::RequiredMissing
            | Self::TooManyElements => ViolationClass::Data,
        }
    }

    /// Stable short code used in reports
    pub fn code(self) -> &'static str {
        match self {
            Self::UnexpectedSegment => "UNEXPECTED_SEGMENT",
            Self::MissingSegment => "MISSING_SEGMENT",
            Self::MissingLoop => "MISSING_LOOP",
            Self::RepeatExceeded => "REPEAT_EXCEEDED",
            Self::EnvelopeMismatch => "ENVELOPE_MISMATCH",
            Self::TooShort => "TOO_SHORT",
            Self::TooLong => "TOO_LONG",
            Self::InvalidDataType => "INVALID_DATA_TYPE",
            Self::InvalidCode => "INVALID_CODE",
            Self::RequiredMissing => "REQUIRED_MISSING",
            Self::TooManyElements => "TOO_MANY_ELEMENTS",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Map node id the finding belongs to (segment code, element ref, loop id)
    pub node_id: String,

    /// Where in the source the finding was made
    pub position: Position,

    /// Kind of finding
    pub kind: ViolationKind,

    /// Human-readable message
    pub message: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(
        node_id: impl Into<String>,
        position: Position,
        kind: ViolationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            position,
            kind,
            message: message.into(),
        }
    }

    /// Whether this violation is structural
    pub fn is_structural(&self) -> bool {
        self.kind.class() == ViolationClass::Structural
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.kind, self.node_id, self.position, self.message
        )
    }
}
