use anyhow::Result;
use edi_adapter_x12::EnvelopeReader;
use edi_ir::{NodeType, ViolationKind};
use edi_schema::{Map, MapLoader};
use edi_validation::{
    CodeListRegistry, Format, InterchangeValidator, Report, ValidationConfig, ValidatorState,
    validate_bytes,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn testdata(name: &str) -> PathBuf {
    repo_root().join("testdata").join("x12").join(name)
}

fn claim_map() -> Result<Arc<Map>> {
    let loader = MapLoader::new(vec![repo_root().join("maps")]);
    Ok(loader.load_for("00401", "HC", "004010X098A1")?)
}

fn validate_file(name: &str, config: ValidationConfig) -> Result<edi_validation::ValidationOutcome> {
    let tokens = EnvelopeReader::open_path(testdata(name))?;
    Ok(InterchangeValidator::new(claim_map()?, config)?
        .with_source(name)
        .validate(tokens))
}

#[test]
fn test_valid_claim() -> Result<()> {
    let outcome = validate_file("claim_valid.x12", ValidationConfig::default())?;
    assert!(outcome.is_valid(), "{:#?}", outcome.violations);
    assert_eq!(outcome.state, ValidatorState::Done);
    assert_eq!(outcome.tree.metadata.segments_read, 30);
    assert_eq!(outcome.tree.segment_count(), 30);
    assert_eq!(
        outcome.tree.metadata.interchange_control.as_deref(),
        Some("000000905")
    );

    let header = outcome.header.expect("ISA header");
    assert_eq!(header.sender_id, "SUBMITTERS.ID");
    assert_eq!(header.version, "00401");
    Ok(())
}

#[test]
fn test_valid_claim_tree_shape() -> Result<()> {
    let outcome = validate_file("claim_valid.x12", ValidationConfig::default())?;
    let root = &outcome.tree.root;
    assert_eq!(root.id, "837.4010.X098.A1");

    let st_loop = root
        .find_child("ISA_LOOP")
        .and_then(|n| n.find_child("GS_LOOP"))
        .and_then(|n| n.find_child("ST_LOOP"))
        .expect("transaction set loop");
    let provider = st_loop.find_child("2000A").expect("billing provider");
    let subscriber = provider.find_child("2000B").expect("subscriber");
    let claim = subscriber.find_child("2300").expect("claim");

    let lines = claim.find_children("2400");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].occurrence, 1);

    let sv1 = lines[0].find_child("SV1").expect("service line");
    let procedure = sv1.find_child("C003").expect("procedure composite");
    assert_eq!(procedure.node_type, NodeType::Composite);
    assert_eq!(
        procedure
            .find_child("SV101-02")
            .and_then(|n| n.value.as_deref()),
        Some("99213")
    );

    let paths = outcome.tree.paths();
    assert!(
        paths
            .iter()
            .any(|p| p.ends_with("2000A/2000B/2010BA/DMG/DMG02"))
    );
    Ok(())
}

#[test]
fn test_claim_with_errors_lenient() -> Result<()> {
    let outcome = validate_file("claim_errors.x12", ValidationConfig::default())?;
    assert_eq!(outcome.state, ValidatorState::Done);

    let found: Vec<(ViolationKind, &str, usize)> = outcome
        .violations
        .iter()
        .map(|v| (v.kind, v.node_id.as_str(), v.position.segment))
        .collect();
    assert_eq!(
        found,
        vec![
            (ViolationKind::MissingSegment, "N4", 12),
            (ViolationKind::InvalidDataType, "DMG02", 17),
            (ViolationKind::UnexpectedSegment, "ZZZ", 19),
            (ViolationKind::EnvelopeMismatch, "SE01", 25),
        ]
    );
    assert_eq!(outcome.structural_count(), 3);
    assert_eq!(outcome.data_count(), 1);

    // Validation resumed after the unexpected segment
    assert_eq!(outcome.tree.metadata.segments_read, 27);
    assert_eq!(outcome.tree.segment_count(), 26);
    Ok(())
}

#[test]
fn test_claim_with_errors_strict() -> Result<()> {
    let outcome = validate_file("claim_errors.x12", ValidationConfig::new().strict(true))?;
    assert_eq!(outcome.state, ValidatorState::Failed);
    assert_eq!(outcome.violations.len(), 3);
    assert_eq!(
        outcome.violations.last().map(|v| v.kind),
        Some(ViolationKind::UnexpectedSegment)
    );
    assert_eq!(outcome.tree.metadata.segments_read, 19);
    Ok(())
}

#[test]
fn test_external_code_lists() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    writeln!(file, "states:\n  - GA\n  - TN")?;
    let codes = CodeListRegistry::from_file(file.path())?;

    let tokens = EnvelopeReader::open_path(testdata("claim_valid.x12"))?;
    let outcome = InterchangeValidator::new(claim_map()?, ValidationConfig::default())?
        .with_codes(Arc::new(codes))
        .validate(tokens);

    let invalid: Vec<&str> = outcome
        .of_kind(ViolationKind::InvalidCode)
        .map(|v| v.node_id.as_str())
        .collect();
    assert_eq!(invalid, vec!["N402", "N402"]);
    assert_eq!(outcome.violations.len(), 2);
    Ok(())
}

#[test]
fn test_truncated_header_is_fatal() {
    let err = EnvelopeReader::open_path(testdata("truncated.x12")).unwrap_err();
    assert!(err.to_string().contains("ISA segment is only 95 characters"));
}

#[test]
fn test_map_shared_between_threads() -> Result<()> {
    let map = claim_map()?;
    let valid = std::fs::read(testdata("claim_valid.x12"))?;
    let errors = std::fs::read(testdata("claim_errors.x12"))?;

    let handles: Vec<_> = [valid, errors]
        .into_iter()
        .map(|data| {
            let map = Arc::clone(&map);
            std::thread::spawn(move || validate_bytes(map, &data, ValidationConfig::default()))
        })
        .collect();
    let counts: Vec<usize> = handles
        .into_iter()
        .map(|h| h.join().expect("validator thread").map(|o| o.violations.len()))
        .collect::<edi_validation::Result<_>>()?;
    assert_eq!(counts, vec![0, 4]);
    Ok(())
}

#[test]
fn test_json_report_of_invalid_claim() -> Result<()> {
    let outcome = validate_file("claim_errors.x12", ValidationConfig::default())?;
    let json = Report::new(&outcome).render(Format::Json)?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value["summary"]["valid"], false);
    assert_eq!(value["summary"]["source"], "claim_errors.x12");
    assert_eq!(value["violations"].as_array().map(Vec::len), Some(4));
    assert_eq!(value["tree"]["root"]["id"], "837.4010.X098.A1");
    Ok(())
}
