//! Validation engine
//!
//! [`InterchangeValidator`] walks a compiled map alongside the token stream.
//! It keeps an explicit stack of open loop frames; each frame remembers how
//! far into its children the stream has advanced and how often each child
//! has occurred. A token is bound by searching forward from the cursor of
//! the innermost frame and then ascending, so a segment that belongs to an
//! enclosing loop closes the inner loops on the way.

use crate::Result;
use crate::codelist::{AcceptAll, CodeSetLookup};
use crate::rules::{Charset, DataTypeValidator, Finding};
use edi_adapter_x12::{EnvelopeTracker, InterchangeHeader};
use edi_ir::{
    Field, NodeId, NodeType, ParseNode, ParseTree, Position, SegmentToken, TreeMetadata,
    Violation, ViolationKind,
};
use edi_schema::{Map, NodeKind, SchemaNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Validation configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Stop at the first segment that matches nothing
    pub strict: bool,
    /// Character set for AN and ID elements
    pub charset: Charset,
}

impl ValidationConfig {
    /// Lenient configuration with the extended charset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict mode
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the charset
    #[must_use]
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }
}

/// Where the validator stands in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorState {
    /// Only the root frame is open
    AwaitingSegment,
    /// At least one loop frame is open
    InLoop,
    /// A token is being bound to a segment node
    InSegment,
    /// The stream ended and every frame was closed
    Done,
    /// Strict mode hit an unexpected segment; later tokens are ignored
    Failed,
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorState::AwaitingSegment => "awaiting segment",
            ValidatorState::InLoop => "in loop",
            ValidatorState::InSegment => "in segment",
            ValidatorState::Done => "done",
            ValidatorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one validation run
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Parse tree, partial when the run failed
    pub tree: ParseTree,
    /// Every violation in the order it was raised
    pub violations: Vec<Violation>,
    /// Final state, `Done` or `Failed`
    pub state: ValidatorState,
    /// ISA header of the interchange, when one was read
    pub header: Option<InterchangeHeader>,
}

impl ValidationOutcome {
    /// Whether no violation was raised
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of structural violations
    #[must_use]
    pub fn structural_count(&self) -> usize {
        self.violations.iter().filter(|v| v.is_structural()).count()
    }

    /// Number of data violations
    #[must_use]
    pub fn data_count(&self) -> usize {
        self.violations.len() - self.structural_count()
    }

    /// Violations of one kind
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// An open loop (or the root) and its progress
#[derive(Debug)]
struct Frame {
    schema: NodeId,
    node: ParseNode,
    /// 0-based ordinal of the child matched last
    cursor: usize,
    /// Occurrences per child ordinal
    counts: Vec<usize>,
}

impl Frame {
    fn new(schema: NodeId, node: ParseNode, child_count: usize) -> Self {
        Self {
            schema,
            node,
            cursor: 0,
            counts: vec![0; child_count],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Codes and qualifiers agree, repeat available
    Qualified,
    /// Codes agree, repeat available
    CodeOnly,
    /// Codes agree, repeat used up
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    depth: usize,
    ordinal: usize,
    node: NodeId,
    exceeded: bool,
}

/// Validates one interchange against a compiled map
pub struct InterchangeValidator {
    map: Arc<Map>,
    config: ValidationConfig,
    types: DataTypeValidator,
    codes: Arc<dyn CodeSetLookup>,
    envelopes: EnvelopeTracker,
    stack: Vec<Frame>,
    state: ValidatorState,
    violations: Vec<Violation>,
    segments_read: usize,
    last_position: Position,
    source: Option<String>,
}

impl InterchangeValidator {
    /// Create a validator over a shared map
    ///
    /// # Errors
    ///
    /// Returns an error if the data type patterns fail to compile.
    pub fn new(map: Arc<Map>, config: ValidationConfig) -> Result<Self> {
        let types = DataTypeValidator::new(config.charset)?;
        let root = map.root();
        let node = ParseNode::new(NodeId::ROOT, root.id.clone(), NodeType::Root);
        let frame = Frame::new(NodeId::ROOT, node, root.child_count());
        Ok(Self {
            map,
            config,
            types,
            codes: Arc::new(AcceptAll),
            envelopes: EnvelopeTracker::new(),
            stack: vec![frame],
            state: ValidatorState::AwaitingSegment,
            violations: Vec::new(),
            segments_read: 0,
            last_position: Position::default(),
            source: None,
        })
    }

    /// Use an external code-set lookup
    #[must_use]
    pub fn with_codes(mut self, codes: Arc<dyn CodeSetLookup>) -> Self {
        self.codes = codes;
        self
    }

    /// Record the source name in the tree metadata
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Current state
    pub fn state(&self) -> ValidatorState {
        self.state
    }

    /// Ids of the open frames, outermost first
    pub fn open_path(&self) -> Vec<&str> {
        self.stack
            .iter()
            .map(|frame| self.map.node(frame.schema).id.as_str())
            .collect()
    }

    /// Violations raised so far
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Validate a whole token stream
    pub fn validate<I>(mut self, tokens: I) -> ValidationOutcome
    where
        I: IntoIterator<Item = SegmentToken>,
    {
        for token in tokens {
            self.feed(token);
            if self.state == ValidatorState::Failed {
                break;
            }
        }
        self.finish()
    }

    /// Process one segment token
    pub fn feed(&mut self, token: SegmentToken) {
        if matches!(self.state, ValidatorState::Failed | ValidatorState::Done) {
            trace!(code = %token.code, state = %self.state, "Ignoring segment");
            return;
        }
        self.segments_read += 1;
        self.last_position = token.position;
        let envelope_findings = self.envelopes.observe(&token);

        match self.locate(&token) {
            Some(candidate) => {
                self.state = ValidatorState::InSegment;
                self.bind(candidate, &token, envelope_findings);
            }
            None => {
                let violation = Violation::new(
                    token.code.clone(),
                    token.position,
                    ViolationKind::UnexpectedSegment,
                    format!(
                        "segment {} is not expected in {}",
                        token.code,
                        self.open_path().join("/")
                    ),
                );
                self.raise_on_top(violation);
                for finding in envelope_findings {
                    self.raise_on_top(finding);
                }
                if self.config.strict {
                    warn!(code = %token.code, segment = token.position.segment, "Unexpected segment, stopping");
                    self.state = ValidatorState::Failed;
                    return;
                }
                debug!(code = %token.code, segment = token.position.segment, "Skipping unexpected segment");
            }
        }

        self.state = if self.stack.len() > 1 {
            ValidatorState::InLoop
        } else {
            ValidatorState::AwaitingSegment
        };
    }

    /// Close every open frame and produce the outcome
    pub fn finish(mut self) -> ValidationOutcome {
        let position = self.last_position;
        let mut root = None;
        while !self.stack.is_empty() {
            root = self.close_top(position);
        }
        let root = root.unwrap_or_else(|| {
            ParseNode::new(NodeId::ROOT, self.map.id().to_string(), NodeType::Root)
        });

        let state = if self.state == ValidatorState::Failed {
            ValidatorState::Failed
        } else {
            ValidatorState::Done
        };
        if !self.violations.is_empty() {
            warn!(
                map = %self.map.id(),
                violations = self.violations.len(),
                state = %state,
                "Interchange has violations"
            );
        }

        let header = self.envelopes.header().cloned();
        let metadata = TreeMetadata {
            source: self.source,
            map_id: Some(self.map.id().to_string()),
            interchange_control: header.as_ref().map(|h| h.control_number.clone()),
            segments_read: self.segments_read,
            validated_at: Some(chrono::Utc::now()),
        };

        ValidationOutcome {
            tree: ParseTree::with_metadata(root, metadata),
            violations: self.violations,
            state,
            header,
        }
    }

    fn locate(&self, token: &SegmentToken) -> Option<Candidate> {
        [Pass::Qualified, Pass::CodeOnly, Pass::Exhausted]
            .into_iter()
            .find_map(|pass| self.search(token, pass))
    }

    // Innermost frame first, children from the cursor on
    fn search(&self, token: &SegmentToken, pass: Pass) -> Option<Candidate> {
        for depth in (0..self.stack.len()).rev() {
            let frame = &self.stack[depth];
            let schema = self.map.node(frame.schema);
            for (ordinal, child) in schema.child_ids().enumerate().skip(frame.cursor) {
                if !self.opens_with(child, token, pass == Pass::Qualified) {
                    continue;
                }
                let available = self
                    .map
                    .node(child)
                    .max_repeat
                    .allows_another(frame.counts[ordinal]);
                if available != (pass == Pass::Exhausted) {
                    return Some(Candidate {
                        depth,
                        ordinal,
                        node: child,
                        exceeded: !available,
                    });
                }
            }
        }
        None
    }

    fn opens_with(&self, id: NodeId, token: &SegmentToken, check_qualifiers: bool) -> bool {
        match self.map.node(id).kind {
            NodeKind::Segment => self.map.segment_matches(id, token, check_qualifiers),
            NodeKind::Loop => self
                .map
                .entry_segment(id)
                .is_some_and(|entry| self.map.segment_matches(entry, token, check_qualifiers)),
            NodeKind::Root | NodeKind::Composite | NodeKind::Element(_) => false,
        }
    }

    fn bind(&mut self, candidate: Candidate, token: &SegmentToken, envelope: Vec<Violation>) {
        while self.stack.len() > candidate.depth + 1 {
            self.close_top(token.position);
        }

        let map = Arc::clone(&self.map);
        let mut target = candidate.node;
        let mut ordinal = candidate.ordinal;
        let mut exceeded = candidate.exceeded;

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return;
            };
            frame.cursor = ordinal;
            frame.counts[ordinal] += 1;
            let occurrence = frame.counts[ordinal] - 1;

            let schema = map.node(target);
            let repeat = exceeded.then(|| {
                Violation::new(
                    schema.id.clone(),
                    token.position,
                    ViolationKind::RepeatExceeded,
                    format!(
                        "{} occurs {} times, at most {} allowed",
                        schema.id,
                        occurrence + 1,
                        schema.max_repeat
                    ),
                )
            });

            match schema.kind {
                NodeKind::Loop => {
                    debug!(
                        loop_id = %schema.id,
                        occurrence,
                        segment = token.position.segment,
                        "Entering loop"
                    );
                    let mut node = ParseNode::new(target, schema.id.clone(), NodeType::Loop)
                        .with_occurrence(occurrence)
                        .with_position(token.position);
                    if let Some(violation) = repeat {
                        self.violations.push(violation.clone());
                        node.add_violation(violation);
                    }
                    self.stack
                        .push(Frame::new(target, node, schema.child_count()));

                    let Some(first) = map.child(target, 0) else {
                        return;
                    };
                    target = first;
                    ordinal = 0;
                    exceeded = false;
                }
                NodeKind::Segment => {
                    trace!(
                        code = %schema.id,
                        path = %map.path(target),
                        occurrence,
                        "Binding segment"
                    );
                    let mut node = self.segment_node(target, schema, token, occurrence);
                    let mut raised: Vec<Violation> = repeat.into_iter().collect();
                    raised.extend(envelope);
                    for violation in raised {
                        node.add_violation(violation);
                    }
                    self.violations
                        .extend(edi_ir::violations(&node).into_iter().cloned());
                    if let Some(frame) = self.stack.last_mut() {
                        frame.node.add_child(node);
                    }
                    return;
                }
                NodeKind::Root | NodeKind::Composite | NodeKind::Element(_) => return,
            }
        }
    }

    fn segment_node(
        &self,
        id: NodeId,
        schema: &SchemaNode,
        token: &SegmentToken,
        occurrence: usize,
    ) -> ParseNode {
        let mut segment = ParseNode::new(id, schema.id.clone(), NodeType::Segment)
            .with_occurrence(occurrence)
            .with_position(token.position);

        let defined = schema.child_count();
        for (idx, child) in schema.child_ids().enumerate() {
            let ordinal = idx + 1;
            let position = token.position.at_element(ordinal);
            let field = token.field(ordinal);
            let child_schema = self.map.node(child);

            match &child_schema.kind {
                NodeKind::Element(_) => {
                    let value = field.map_or("", Field::first);
                    if let Some(Field::Composite(parts)) = field {
                        if parts.len() > 1 {
                            segment.add_violation(Violation::new(
                                child_schema.id.clone(),
                                position.at_component(2),
                                ViolationKind::TooManyElements,
                                format!(
                                    "{} is a simple element but carries {} components",
                                    child_schema.id,
                                    parts.len()
                                ),
                            ));
                        }
                    }
                    self.bind_element(&mut segment, child, child_schema, value, position);
                }
                NodeKind::Composite => {
                    let parts = field.map(Field::parts).unwrap_or_default();
                    self.bind_composite(&mut segment, child, child_schema, &parts, position);
                }
                NodeKind::Root | NodeKind::Loop | NodeKind::Segment => {}
            }
        }

        if token.fields.len() > defined {
            segment.add_violation(Violation::new(
                schema.id.clone(),
                token.position.at_element(defined + 1),
                ViolationKind::TooManyElements,
                format!(
                    "{} has {} elements, at most {defined} defined",
                    schema.id,
                    token.fields.len()
                ),
            ));
        }

        segment
    }

    fn bind_composite(
        &self,
        segment: &mut ParseNode,
        id: NodeId,
        schema: &SchemaNode,
        parts: &[&str],
        position: Position,
    ) {
        if parts.iter().all(|part| part.is_empty()) {
            if schema.is_required() {
                segment.add_violation(Violation::new(
                    schema.id.clone(),
                    position,
                    ViolationKind::RequiredMissing,
                    format!("required composite {} is missing", schema.id),
                ));
            }
            return;
        }

        let mut composite =
            ParseNode::new(id, schema.id.clone(), NodeType::Composite).with_position(position);
        let defined = schema.child_count();
        for (idx, child) in schema.child_ids().enumerate() {
            let value = parts.get(idx).copied().unwrap_or("");
            let child_schema = self.map.node(child);
            self.bind_element(
                &mut composite,
                child,
                child_schema,
                value,
                position.at_component(idx + 1),
            );
        }
        if parts.len() > defined {
            composite.add_violation(Violation::new(
                schema.id.clone(),
                position.at_component(defined + 1),
                ViolationKind::TooManyElements,
                format!(
                    "{} has {} components, at most {defined} defined",
                    schema.id,
                    parts.len()
                ),
            ));
        }
        segment.add_child(composite);
    }

    fn bind_element(
        &self,
        parent: &mut ParseNode,
        id: NodeId,
        schema: &SchemaNode,
        value: &str,
        position: Position,
    ) {
        let Some(spec) = schema.element() else {
            return;
        };
        let findings =
            self.types
                .validate_element(value, spec, schema.usage, self.codes.as_ref());
        let to_violation = |finding: Finding| {
            Violation::new(schema.id.clone(), position, finding.kind, finding.message)
        };

        if value.is_empty() {
            for finding in findings {
                parent.add_violation(to_violation(finding));
            }
            return;
        }

        let mut element = ParseNode::element(id, schema.id.clone(), value).with_position(position);
        for finding in findings {
            element.add_violation(to_violation(finding));
        }
        parent.add_child(element);
    }

    fn raise_on_top(&mut self, violation: Violation) {
        if let Some(frame) = self.stack.last_mut() {
            frame.node.add_violation(violation.clone());
        }
        self.violations.push(violation);
    }

    /// Pop the innermost frame, report its missing required children and
    /// attach it to its parent. Returns the node when there is no parent.
    fn close_top(&mut self, position: Position) -> Option<ParseNode> {
        let mut frame = self.stack.pop()?;

        if self.state != ValidatorState::Failed {
            let map = Arc::clone(&self.map);
            for (ordinal, child) in map.node(frame.schema).child_ids().enumerate() {
                let child_schema = map.node(child);
                if frame.counts[ordinal] > 0 || !child_schema.is_required() {
                    continue;
                }
                let (kind, what) = match child_schema.kind {
                    NodeKind::Loop => (ViolationKind::MissingLoop, "loop"),
                    _ => (ViolationKind::MissingSegment, "segment"),
                };
                let violation = Violation::new(
                    child_schema.id.clone(),
                    position,
                    kind,
                    format!(
                        "required {what} {} ({}) is missing from {}",
                        child_schema.id,
                        child_schema.name,
                        frame.node.id
                    ),
                );
                self.violations.push(violation.clone());
                frame.node.add_violation(violation);
            }
        }

        trace!(id = %frame.node.id, "Closing frame");
        match self.stack.last_mut() {
            Some(parent) => {
                parent.node.add_child(frame.node);
                None
            }
            None => Some(frame.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_schema::{DataType, ElementSpec, NodeSpec, Repeat};

    fn token(segment: usize, text: &str) -> SegmentToken {
        let mut parts = text.split('*');
        let code = parts.next().unwrap_or_default();
        let fields = parts
            .map(|p| {
                if p.contains(':') {
                    Field::Composite(p.split(':').map(str::to_string).collect())
                } else {
                    Field::Simple(p.to_string())
                }
            })
            .collect();
        SegmentToken::new(code, fields, Position::new(segment, segment * 10))
    }

    fn tokens(lines: &[&str]) -> Vec<SegmentToken> {
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| token(idx + 1, line))
            .collect()
    }

    fn an(min: usize, max: usize) -> ElementSpec {
        ElementSpec::new(DataType::AlphaNumeric, min, max)
    }

    // A ⊃ B ⊃ X, with Y in A after B
    fn nested_map() -> Arc<Map> {
        let x = NodeSpec::segment("X", "Inner")
            .child(NodeSpec::element("X01", "Value", an(1, 5)).required());
        let w = NodeSpec::segment("W", "Head").child(NodeSpec::element("W01", "Value", an(1, 5)));
        let b = NodeSpec::loop_node("B", "Inner loop")
            .repeat(Repeat::Unbounded)
            .child(x.required());
        let y = NodeSpec::segment("Y", "Trailer").child(NodeSpec::element("Y01", "Value", an(1, 5)));
        let a = NodeSpec::loop_node("A", "Outer loop")
            .required()
            .children([w.required(), b, y.required()]);
        Arc::new(Map::compile(NodeSpec::root("T", "Test").child(a)).unwrap())
    }

    fn run(map: Arc<Map>, config: ValidationConfig, lines: &[&str]) -> ValidationOutcome {
        InterchangeValidator::new(map, config)
            .unwrap()
            .validate(tokens(lines))
    }

    #[test]
    fn test_loop_ascent() {
        let map = nested_map();
        let mut validator = InterchangeValidator::new(map, ValidationConfig::new()).unwrap();
        assert_eq!(validator.state(), ValidatorState::AwaitingSegment);

        validator.feed(token(1, "W*1"));
        validator.feed(token(2, "X*1"));
        assert_eq!(validator.open_path(), vec!["T", "A", "B"]);
        assert_eq!(validator.state(), ValidatorState::InLoop);

        validator.feed(token(3, "Y*1"));
        assert_eq!(validator.open_path(), vec!["T", "A"]);

        let outcome = validator.finish();
        assert!(outcome.is_valid(), "{:?}", outcome.violations);
        assert_eq!(outcome.state, ValidatorState::Done);

        let a = &outcome.tree.root.children[0];
        let ids: Vec<&str> = a.children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["W", "B", "Y"]);
        assert_eq!(a.children[1].children[0].id, "X");
    }

    #[test]
    fn test_loop_repeats_become_siblings() {
        let outcome = run(
            nested_map(),
            ValidationConfig::new(),
            &["W*1", "X*1", "X*2", "X*3", "Y*1"],
        );
        assert!(outcome.is_valid(), "{:?}", outcome.violations);

        let a = &outcome.tree.root.children[0];
        let loops = a.find_children("B");
        assert_eq!(loops.len(), 3);
        let occurrences: Vec<usize> = loops.iter().map(|n| n.occurrence).collect();
        assert_eq!(occurrences, vec![0, 1, 2]);
    }

    #[test]
    fn test_unexpected_segment_lenient_resumes() {
        let outcome = run(
            nested_map(),
            ValidationConfig::new(),
            &["W*1", "Q*1", "X*1", "Y*1"],
        );
        assert_eq!(outcome.violations.len(), 1);
        let violation = &outcome.violations[0];
        assert_eq!(violation.kind, ViolationKind::UnexpectedSegment);
        assert_eq!(violation.node_id, "Q");
        assert_eq!(violation.position.segment, 2);
        assert_eq!(outcome.state, ValidatorState::Done);
        assert_eq!(outcome.tree.metadata.segments_read, 4);
        assert_eq!(outcome.tree.segment_count(), 3);
    }

    #[test]
    fn test_unexpected_segment_strict_fails() {
        let outcome = run(
            nested_map(),
            ValidationConfig::new().strict(true),
            &["W*1", "Q*1", "X*1", "Y*1"],
        );
        assert_eq!(outcome.state, ValidatorState::Failed);
        assert_eq!(outcome.violations.len(), 1);
        // Partial tree keeps what was bound before the failure
        assert_eq!(outcome.tree.segment_count(), 1);
        assert_eq!(outcome.tree.metadata.segments_read, 2);
    }

    #[test]
    fn test_out_of_order_segment_is_unexpected() {
        let outcome = run(nested_map(), ValidationConfig::new(), &["W*1", "Y*1", "X*1"]);
        let kinds: Vec<ViolationKind> = outcome.violations.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::UnexpectedSegment]);
        assert_eq!(outcome.violations[0].node_id, "X");
    }

    #[test]
    fn test_missing_required_segment_and_loop() {
        let outcome = run(nested_map(), ValidationConfig::new(), &["W*1"]);
        let found: Vec<(ViolationKind, &str)> = outcome
            .violations
            .iter()
            .map(|v| (v.kind, v.node_id.as_str()))
            .collect();
        assert_eq!(found, vec![(ViolationKind::MissingSegment, "Y")]);

        let outcome = run(nested_map(), ValidationConfig::new(), &[]);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::MissingLoop);
        assert_eq!(outcome.violations[0].node_id, "A");
    }

    #[test]
    fn test_repeat_exceeded_binds() {
        let outcome = run(nested_map(), ValidationConfig::new(), &["W*1", "W*2", "Y*1"]);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::RepeatExceeded);

        let a = &outcome.tree.root.children[0];
        let heads = a.find_children("W");
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[1].occurrence, 1);
        assert_eq!(heads[1].violations.len(), 1);
    }

    #[test]
    fn test_data_violations_accumulate() {
        let outcome = run(
            nested_map(),
            ValidationConfig::new(),
            &["W*TOOLONG", "X*", "Y*1*EXTRA"],
        );
        let kinds: Vec<ViolationKind> = outcome.violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::TooLong,
                ViolationKind::RequiredMissing,
                ViolationKind::TooManyElements
            ]
        );
        assert_eq!(outcome.data_count(), 3);
        assert_eq!(outcome.structural_count(), 0);
        assert_eq!(outcome.violations[0].position.element, Some(1));
        assert_eq!(outcome.violations[2].position.element, Some(2));
        assert_eq!(outcome.tree.node_violations().len(), 3);
    }

    fn qualified_map() -> Arc<Map> {
        let hl = |code: &str| {
            NodeSpec::segment("HL", "Hierarchical level")
                .required()
                .children([
                    NodeSpec::element("HL01", "Id", ElementSpec::new(DataType::Numeric(0), 1, 12))
                        .required(),
                    NodeSpec::element(
                        "HL02",
                        "Parent id",
                        ElementSpec::new(DataType::Numeric(0), 1, 12),
                    ),
                    NodeSpec::element(
                        "HL03",
                        "Level code",
                        ElementSpec::new(DataType::Identifier, 1, 2)
                            .with_codes([code])
                            .as_qualifier(),
                    )
                    .required(),
                ])
        };
        let nm1 = |code: &str| {
            NodeSpec::segment("NM1", "Name").required().children([
                NodeSpec::element(
                    "NM101",
                    "Entity",
                    ElementSpec::new(DataType::Identifier, 2, 3).with_codes([code]),
                )
                .required(),
                NodeSpec::element("NM102", "Type", ElementSpec::new(DataType::Identifier, 1, 1)),
            ])
        };
        let provider = NodeSpec::loop_node("2000A", "Billing provider")
            .required()
            .repeat(Repeat::Unbounded)
            .children([
                hl("20"),
                NodeSpec::loop_node("2010AA", "Provider name")
                    .required()
                    .child(nm1("85")),
            ]);
        let subscriber = NodeSpec::loop_node("2000B", "Subscriber")
            .repeat(Repeat::Unbounded)
            .children([
                hl("22"),
                NodeSpec::loop_node("2010BA", "Subscriber name").child(nm1("IL")),
            ]);
        Arc::new(
            Map::compile(NodeSpec::root("837", "Claim").children([provider, subscriber])).unwrap(),
        )
    }

    #[test]
    fn test_qualifier_discriminates_loops() {
        let map = qualified_map();
        let mut validator = InterchangeValidator::new(map, ValidationConfig::new()).unwrap();
        for t in tokens(&["HL*1**20", "NM1*85*2", "HL*2**22", "NM1*IL*1"]) {
            validator.feed(t);
        }
        assert_eq!(validator.open_path(), vec!["837", "2000B", "2010BA"]);
        let outcome = validator.finish();
        assert!(outcome.is_valid(), "{:?}", outcome.violations);
    }

    #[test]
    fn test_bad_qualifier_is_an_invalid_code() {
        let outcome = run(
            qualified_map(),
            ValidationConfig::new(),
            &["HL*1**20", "NM1*87*2"],
        );
        let kinds: Vec<ViolationKind> = outcome.violations.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::InvalidCode]);
        assert_eq!(outcome.violations[0].node_id, "NM101");
    }

    #[test]
    fn test_composite_binding() {
        let sv1 = NodeSpec::segment("SV1", "Service").required().children([
            NodeSpec::composite("C003", "Procedure").required().children([
                NodeSpec::element(
                    "SV101-01",
                    "Qualifier",
                    ElementSpec::new(DataType::Identifier, 2, 2).with_codes(["HC"]),
                )
                .required(),
                NodeSpec::element("SV101-02", "Code", an(1, 48)).required(),
            ]),
            NodeSpec::element("SV102", "Amount", ElementSpec::new(DataType::Decimal, 1, 18)),
        ]);
        let map = Arc::new(Map::compile(NodeSpec::root("T", "Test").child(sv1)).unwrap());

        let outcome = run(Arc::clone(&map), ValidationConfig::new(), &["SV1*HC:99213*40."]);
        assert!(outcome.is_valid(), "{:?}", outcome.violations);
        let composite = &outcome.tree.root.children[0].children[0];
        assert_eq!(composite.node_type, NodeType::Composite);
        assert_eq!(composite.children.len(), 2);
        assert_eq!(composite.children[1].value.as_deref(), Some("99213"));

        let outcome = run(Arc::clone(&map), ValidationConfig::new(), &["SV1*XX:99213:9*4a"]);
        let kinds: Vec<ViolationKind> = outcome.violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::TooManyElements,
                ViolationKind::InvalidCode,
                ViolationKind::InvalidDataType,
            ]
        );
        assert_eq!(outcome.violations[0].position.component, Some(3));
        assert_eq!(outcome.violations[1].position.component, Some(1));

        let outcome = run(map, ValidationConfig::new(), &["SV1**40"]);
        assert_eq!(outcome.violations[0].kind, ViolationKind::RequiredMissing);
        assert_eq!(outcome.violations[0].node_id, "C003");
    }

    #[test]
    fn test_outcome_metadata() {
        let outcome = InterchangeValidator::new(nested_map(), ValidationConfig::new())
            .unwrap()
            .with_source("claims.x12")
            .validate(tokens(&["W*1", "Y*1"]));
        let metadata = &outcome.tree.metadata;
        assert_eq!(metadata.source.as_deref(), Some("claims.x12"));
        assert_eq!(metadata.map_id.as_deref(), Some("T"));
        assert_eq!(metadata.segments_read, 2);
        assert!(metadata.validated_at.is_some());
        assert!(outcome.header.is_none());
    }

    #[test]
    fn test_shared_map_across_threads() {
        let map = nested_map();
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    let mut lines = vec!["W*1".to_string()];
                    lines.extend((0..n).map(|i| format!("X*{i}")));
                    lines.push("Y*1".to_string());
                    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
                    run(map, ValidationConfig::new(), &refs)
                })
            })
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            let outcome = handle.join().unwrap();
            assert!(outcome.is_valid());
            assert_eq!(outcome.tree.segment_count(), n + 2);
        }
    }
}
