//! Raw segment tokens

use crate::metadata::Position;
use serde::{Deserialize, Serialize};

/// One field of a segment, as split by the element delimiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    /// Field without sub-element delimiters
    Simple(String),
    /// Field split on the sub-element delimiter
    Composite(Vec<String>),
}

impl Field {
    /// Text of the field, or of its first component for composites
    pub fn first(&self) -> &str {
        match self {
            Field::Simple(value) => value,
            Field::Composite(parts) => parts.first().map_or("", String::as_str),
        }
    }

    /// Whether the field carries no data at all
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Simple(value) => value.is_empty(),
            Field::Composite(parts) => parts.iter().all(String::is_empty),
        }
    }

    /// Components of the field; a simple field is a single component
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Field::Simple(value) => vec![value.as_str()],
            Field::Composite(parts) => parts.iter().map(String::as_str).collect(),
        }
    }
}

/// A segment as read from the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentToken {
    /// Segment code (2-3 characters, e.g. `NM1`)
    pub code: String,

    /// Fields following the code, in source order
    pub fields: Vec<Field>,

    /// Source position of the segment
    pub position: Position,
}

impl SegmentToken {
    /// Create a segment token
    pub fn new(code: impl Into<String>, fields: Vec<Field>, position: Position) -> Self {
        Self {
            code: code.into(),
            fields,
            position,
        }
    }

    /// Field by 1-indexed element ordinal (as in `NM101`)
    pub fn field(&self, ordinal: usize) -> Option<&Field> {
        ordinal.checked_sub(1).and_then(|idx| self.fields.get(idx))
    }

    /// Text of a field by 1-indexed ordinal; empty when absent
    pub fn value(&self, ordinal: usize) -> &str {
        self.field(ordinal).map_or("", Field::first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(value: &str) -> Field {
        Field::Simple(value.to_string())
    }

    #[test]
    fn test_field_accessors() {
        let composite = Field::Composite(vec!["HC".to_string(), "99213".to_string()]);
        assert_eq!(composite.first(), "HC");
        assert_eq!(composite.parts(), vec!["HC", "99213"]);
        assert!(!composite.is_empty());

        assert!(Field::Composite(vec![String::new(), String::new()]).is_empty());
        assert!(simple("").is_empty());
        assert_eq!(simple("85").parts(), vec!["85"]);
    }

    #[test]
    fn test_segment_value_by_ordinal() {
        let token = SegmentToken::new(
            "NM1",
            vec![simple("85"), simple("2"), simple("ACME")],
            Position::new(4, 200),
        );
        assert_eq!(token.value(1), "85");
        assert_eq!(token.value(3), "ACME");
        assert_eq!(token.value(9), "");
        assert_eq!(token.value(0), "");
        assert!(token.field(0).is_none());
    }
}
