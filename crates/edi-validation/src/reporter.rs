//! Validation reporting
//!
//! Turns a [`ValidationOutcome`] into text diagnostics (one line per
//! violation) or a JSON document carrying the summary, the violations and
//! the parse tree.

use crate::engine::{ValidationOutcome, ValidatorState};
use crate::{Error, Result};
use edi_ir::{ParseTree, Violation, ViolationClass, ViolationKind};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output format of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Text => f.write_str("text"),
            Format::Json => f.write_str("json"),
        }
    }
}

/// One diagnostic line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    /// 1-based segment ordinal
    pub segment: usize,
    /// Byte offset of the segment
    pub offset: usize,
    pub element: Option<usize>,
    pub component: Option<usize>,
    /// Map node id
    pub node_id: String,
    pub kind: ViolationKind,
    pub class: ViolationClass,
    pub message: String,
}

impl From<&Violation> for ReportLine {
    fn from(violation: &Violation) -> Self {
        Self {
            segment: violation.position.segment,
            offset: violation.position.offset,
            element: violation.position.element,
            component: violation.position.component,
            node_id: violation.node_id.clone(),
            kind: violation.kind,
            class: violation.kind.class(),
            message: violation.message.clone(),
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}", self.segment)?;
        if let Some(element) = self.element {
            write!(f, ", element {element:02}")?;
            if let Some(component) = self.component {
                write!(f, "-{component:02}")?;
            }
        }
        let class = match self.class {
            ViolationClass::Structural => "structural",
            ViolationClass::Data => "data",
        };
        write!(
            f,
            ": {class} {} {}: {}",
            self.kind.code(),
            self.node_id,
            self.message
        )
    }
}

/// Counts over one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub source: Option<String>,
    pub map_id: Option<String>,
    pub interchange_control: Option<String>,
    pub state: ValidatorState,
    pub segments_read: usize,
    pub structural: usize,
    pub data: usize,
    pub valid: bool,
}

impl ReportSummary {
    /// Total number of violations
    #[must_use]
    pub fn total(&self) -> usize {
        self.structural + self.data
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source.as_deref().unwrap_or("<input>");
        let verdict = if self.valid { "valid" } else { "invalid" };
        write!(
            f,
            "{source}: {verdict} ({} segments read, {} structural, {} data violations)",
            self.segments_read, self.structural, self.data
        )?;
        if self.state == ValidatorState::Failed {
            f.write_str(", stopped at first unexpected segment")?;
        }
        Ok(())
    }
}

/// A rendered-ready view of a validation outcome
#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub summary: ReportSummary,
    pub violations: Vec<ReportLine>,
    pub tree: &'a ParseTree,
}

impl<'a> Report<'a> {
    /// Build a report over an outcome
    #[must_use]
    pub fn new(outcome: &'a ValidationOutcome) -> Self {
        let metadata = &outcome.tree.metadata;
        let summary = ReportSummary {
            source: metadata.source.clone(),
            map_id: metadata.map_id.clone(),
            interchange_control: metadata.interchange_control.clone(),
            state: outcome.state,
            segments_read: metadata.segments_read,
            structural: outcome.structural_count(),
            data: outcome.data_count(),
            valid: outcome.is_valid(),
        };
        Self {
            summary,
            violations: outcome.violations.iter().map(ReportLine::from).collect(),
            tree: &outcome.tree,
        }
    }

    /// Diagnostic lines followed by the summary
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.violations {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out.push_str(&self.summary.to_string());
        out.push('\n');
        out
    }

    /// Pretty-printed JSON document
    ///
    /// # Errors
    ///
    /// Returns [`Error::Report`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render in the given format
    ///
    /// # Errors
    ///
    /// See [`Report::to_json`].
    pub fn render(&self, format: Format) -> Result<String> {
        match format {
            Format::Text => Ok(self.to_text()),
            Format::Json => self.to_json(),
        }
    }

    /// Write the rendered report
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W, format: Format) -> Result<()> {
        let rendered = self.render(format)?;
        writer.write_all(rendered.as_bytes())?;
        if format == Format::Json {
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}
