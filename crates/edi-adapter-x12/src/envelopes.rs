//! X12 envelope handling (ISA/IEA, GS/GE, ST/SE)
//!
//! The structural rules of an envelope come from the map. What the map
//! cannot express is the agreement between a header and its trailer: the
//! control numbers must match and the trailer counts must equal what was
//! actually read. [`EnvelopeTracker`] checks those as tokens go by.

use edi_ir::{SegmentToken, Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// ISA - Interchange Control Header fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterchangeHeader {
    /// Interchange sender id qualifier (ISA05)
    pub sender_qualifier: String,
    /// Interchange sender id (ISA06), trailing padding removed
    pub sender_id: String,
    /// Interchange receiver id qualifier (ISA07)
    pub receiver_qualifier: String,
    /// Interchange receiver id (ISA08), trailing padding removed
    pub receiver_id: String,
    /// Interchange date, YYMMDD (ISA09)
    pub date: String,
    /// Interchange time, HHMM (ISA10)
    pub time: String,
    /// Interchange control version number (ISA12)
    pub version: String,
    /// Interchange control number (ISA13)
    pub control_number: String,
    /// Usage indicator, `P` or `T` (ISA15)
    pub usage_indicator: String,
}

impl InterchangeHeader {
    /// Extract the header fields from an ISA token
    pub fn from_token(token: &SegmentToken) -> Option<Self> {
        if token.code != "ISA" {
            return None;
        }
        let text = |ordinal| token.value(ordinal).trim_end().to_string();
        Some(Self {
            sender_qualifier: text(5),
            sender_id: text(6),
            receiver_qualifier: text(7),
            receiver_id: text(8),
            date: text(9),
            time: text(10),
            version: text(12),
            control_number: text(13),
            usage_indicator: text(15),
        })
    }

    /// Whether the interchange is flagged as test data
    pub fn is_test(&self) -> bool {
        self.usage_indicator == "T"
    }
}

/// GS - Functional Group Header fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupHeader {
    /// Functional identifier code (GS01), e.g. `HC`
    pub functional_id: String,
    /// Application sender's code (GS02)
    pub sender: String,
    /// Application receiver's code (GS03)
    pub receiver: String,
    /// Group control number (GS06)
    pub control_number: String,
    /// Version / release / industry identifier code (GS08)
    pub version: String,
}

impl GroupHeader {
    /// Extract the header fields from a GS token
    pub fn from_token(token: &SegmentToken) -> Option<Self> {
        if token.code != "GS" {
            return None;
        }
        let text = |ordinal| token.value(ordinal).trim().to_string();
        Some(Self {
            functional_id: text(1),
            sender: text(2),
            receiver: text(3),
            control_number: text(6),
            version: text(8),
        })
    }
}

#[derive(Debug)]
struct OpenEnvelope {
    control_number: String,
    /// Groups inside an interchange, sets inside a group, segments inside a set
    count: usize,
}

impl OpenEnvelope {
    fn new(control_number: &str) -> Self {
        Self {
            control_number: control_number.trim().to_string(),
            count: 0,
        }
    }
}

/// Checks header/trailer agreement of nested envelopes
///
/// Feed every token in stream order to [`EnvelopeTracker::observe`]. The
/// tracker never fails; disagreements come back as
/// [`ViolationKind::EnvelopeMismatch`] violations.
#[derive(Debug, Default)]
pub struct EnvelopeTracker {
    interchange: Option<OpenEnvelope>,
    group: Option<OpenEnvelope>,
    set: Option<OpenEnvelope>,
    header: Option<InterchangeHeader>,
    groups: Vec<GroupHeader>,
    transaction_sets: usize,
}

impl EnvelopeTracker {
    /// Create a tracker with no open envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Header of the most recent interchange
    pub fn header(&self) -> Option<&InterchangeHeader> {
        self.header.as_ref()
    }

    /// Headers of every functional group seen so far
    pub fn groups(&self) -> &[GroupHeader] {
        &self.groups
    }

    /// Number of transaction sets opened so far
    pub fn transaction_sets(&self) -> usize {
        self.transaction_sets
    }

    /// Account for one token and return the mismatches it reveals
    pub fn observe(&mut self, token: &SegmentToken) -> Vec<Violation> {
        let mut violations = Vec::new();

        if let Some(set) = self.set.as_mut() {
            set.count += 1;
        }

        match token.code.as_str() {
            "ISA" => {
                self.header = InterchangeHeader::from_token(token);
                self.interchange = Some(OpenEnvelope::new(token.value(13)));
                self.group = None;
                self.set = None;
            }
            "GS" => {
                if let Some(interchange) = self.interchange.as_mut() {
                    interchange.count += 1;
                }
                if let Some(group) = GroupHeader::from_token(token) {
                    self.groups.push(group);
                }
                self.group = Some(OpenEnvelope::new(token.value(6)));
                self.set = None;
            }
            "ST" => {
                if let Some(group) = self.group.as_mut() {
                    group.count += 1;
                }
                self.transaction_sets += 1;
                let mut set = OpenEnvelope::new(token.value(2));
                set.count = 1;
                self.set = Some(set);
            }
            "SE" => close(token, "ST", self.set.take(), "segment count", &mut violations),
            "GE" => close(
                token,
                "GS",
                self.group.take(),
                "transaction set count",
                &mut violations,
            ),
            "IEA" => close(
                token,
                "ISA",
                self.interchange.take(),
                "functional group count",
                &mut violations,
            ),
            _ => {}
        }

        for violation in &violations {
            debug!(%violation, "Envelope mismatch");
        }
        violations
    }
}

// Every trailer carries its count in element 01 and the control number in 02
fn close(
    token: &SegmentToken,
    header_code: &str,
    open: Option<OpenEnvelope>,
    counted: &str,
    violations: &mut Vec<Violation>,
) {
    const COUNT: usize = 1;
    const CONTROL: usize = 2;

    let mismatch = |ordinal: usize, message: String| {
        Violation::new(
            format!("{}{ordinal:02}", token.code),
            token.position.at_element(ordinal),
            ViolationKind::EnvelopeMismatch,
            message,
        )
    };

    let Some(open) = open else {
        violations.push(Violation::new(
            token.code.clone(),
            token.position,
            ViolationKind::EnvelopeMismatch,
            format!("{} trailer without a matching {header_code} header", token.code),
        ));
        return;
    };

    let control = token.value(CONTROL).trim();
    if control != open.control_number {
        violations.push(mismatch(
            CONTROL,
            format!(
                "control number '{control}' does not match {header_code} control number '{}'",
                open.control_number
            ),
        ));
    }

    let declared = token.value(COUNT).trim();
    match declared.parse::<usize>() {
        Ok(n) if n == open.count => {}
        Ok(n) => violations.push(mismatch(
            COUNT,
            format!("declared {counted} {n} but {} were read", open.count),
        )),
        Err(_) => violations.push(mismatch(
            COUNT,
            format!("declared {counted} '{declared}' is not a number"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_ir::{Field, Position};

    fn token(segment: usize, text: &str) -> SegmentToken {
        let mut parts = text.split('*');
        let code = parts.next().unwrap_or_default();
        let fields = parts.map(|p| Field::Simple(p.to_string())).collect();
        SegmentToken::new(code, fields, Position::new(segment, 0))
    }

    const ISA: &str = "ISA*00*          *00*          *ZZ*SUBMITTERS.ID  *ZZ*RECEIVERS.ID   *030101*1253*U*00401*000000905*1*T*:";

    fn run(lines: &[&str]) -> (EnvelopeTracker, Vec<Violation>) {
        let mut tracker = EnvelopeTracker::new();
        let mut violations = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            violations.extend(tracker.observe(&token(idx + 1, line)));
        }
        (tracker, violations)
    }

    #[test]
    fn test_interchange_header_fields() {
        let header = InterchangeHeader::from_token(&token(1, ISA)).unwrap();
        assert_eq!(header.sender_qualifier, "ZZ");
        assert_eq!(header.sender_id, "SUBMITTERS.ID");
        assert_eq!(header.receiver_id, "RECEIVERS.ID");
        assert_eq!(header.version, "00401");
        assert_eq!(header.control_number, "000000905");
        assert!(header.is_test());

        assert!(InterchangeHeader::from_token(&token(1, "GS*HC")).is_none());
    }

    #[test]
    fn test_matching_envelopes() {
        let (tracker, violations) = run(&[
            ISA,
            "GS*HC*S*R*20030101*1253*1*X*004010X098A1",
            "ST*837*0021",
            "BHT*0019",
            "SE*3*0021",
            "ST*837*0022",
            "SE*2*0022",
            "GE*2*1",
            "IEA*1*000000905",
        ]);
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(tracker.transaction_sets(), 2);
        assert_eq!(tracker.groups().len(), 1);
        assert_eq!(tracker.groups()[0].functional_id, "HC");
        assert_eq!(tracker.groups()[0].version, "004010X098A1");
    }

    #[test]
    fn test_control_number_mismatch() {
        let (_, violations) = run(&[
            ISA,
            "GS*HC*S*R*20030101*1253*1*X*004010X098A1",
            "ST*837*0021",
            "SE*2*0099",
            "GE*1*1",
            "IEA*1*000000906",
        ]);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].node_id, "SE02");
        assert_eq!(violations[0].position.segment, 4);
        assert_eq!(violations[0].position.element, Some(2));
        assert_eq!(violations[1].node_id, "IEA02");
        assert!(violations.iter().all(|v| v.kind == ViolationKind::EnvelopeMismatch));
    }

    #[test]
    fn test_count_mismatches() {
        let (_, violations) = run(&[
            ISA,
            "GS*HC*S*R*20030101*1253*7*X*004010X098A1",
            "ST*837*0021",
            "BHT*0019",
            "SE*4*0021",
            "GE*2*7",
            "IEA*3*000000905",
        ]);
        let ids: Vec<&str> = violations.iter().map(|v| v.node_id.as_str()).collect();
        assert_eq!(ids, vec!["SE01", "GE01", "IEA01"]);
        assert!(violations[0].message.contains("3 were read"));
    }

    #[test]
    fn test_non_numeric_count() {
        let (_, violations) = run(&[ISA, "IEA*X*000000905"]);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("not a number"));
    }

    #[test]
    fn test_trailer_without_header() {
        let (_, violations) = run(&[ISA, "SE*1*0001", "IEA*0*000000905"]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].node_id, "SE");
        assert!(violations[0].message.contains("without a matching ST"));
    }
}
