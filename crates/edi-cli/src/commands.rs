//! Subcommand handlers

use anyhow::{Context, anyhow};
use edi_adapter_sql::{emit, render};
use edi_adapter_x12::{GroupHeader, InterchangeHeader, read_all};
use edi_ir::SegmentToken;
use edi_schema::MapLoader;
use edi_validation::{
    CodeSetLookup, Format, InterchangeValidator, Report, ValidationConfig, ValidationOutcome,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Every input was valid
pub const EXIT_VALID: u8 = 0;
/// At least one input carried violations
pub const EXIT_INVALID: u8 = 1;
/// An input could not be validated at all
pub const EXIT_FATAL: u8 = 2;

/// Inputs of `edi validate` after settings and flags are merged
pub struct ValidateJob {
    pub files: Vec<PathBuf>,
    /// Map id; picked from the envelope when absent
    pub map: Option<String>,
    pub codes: Arc<dyn CodeSetLookup>,
    pub config: ValidationConfig,
    pub format: Format,
}

/// Validate every file concurrently and print the reports in input order
pub async fn run_validate(loader: Arc<MapLoader>, job: ValidateJob) -> anyhow::Result<u8> {
    let handles: Vec<_> = job
        .files
        .iter()
        .cloned()
        .map(|path| {
            let loader = Arc::clone(&loader);
            let codes = Arc::clone(&job.codes);
            let map = job.map.clone();
            let config = job.config;
            tokio::task::spawn_blocking(move || {
                validate_file(&loader, map.as_deref(), codes, config, &path)
            })
        })
        .collect();

    let mut exit = EXIT_VALID;
    for (path, handle) in job.files.iter().zip(handles) {
        match handle.await? {
            Ok(outcome) => {
                let mut stdout = std::io::stdout().lock();
                Report::new(&outcome).write_to(&mut stdout, job.format)?;
                stdout.flush()?;
                if !outcome.is_valid() {
                    exit = exit.max(EXIT_INVALID);
                }
            }
            Err(e) => {
                error!("{}: {e:#}", path.display());
                exit = EXIT_FATAL;
            }
        }
    }
    Ok(exit)
}

fn validate_file(
    loader: &MapLoader,
    map_id: Option<&str>,
    codes: Arc<dyn CodeSetLookup>,
    config: ValidationConfig,
    path: &Path,
) -> anyhow::Result<ValidationOutcome> {
    let data = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let tokens = read_all(&data)?;
    debug!(file = %path.display(), segments = tokens.len(), "Tokenized input");

    let map = match map_id {
        Some(id) => loader.load_map(id)?,
        None => {
            let (icvn, fic, vriic) = envelope_keys(&tokens)
                .ok_or_else(|| anyhow!("no ISA/GS header to select a map from, pass --map"))?;
            loader.load_for(&icvn, &fic, &vriic)?
        }
    };
    info!(file = %path.display(), map = map.id(), "Validating");

    Ok(InterchangeValidator::new(map, config)?
        .with_codes(codes)
        .with_source(path.display().to_string())
        .validate(tokens))
}

/// ISA12, GS01 and GS08 of the first functional group
fn envelope_keys(tokens: &[SegmentToken]) -> Option<(String, String, String)> {
    let header = tokens.iter().find_map(InterchangeHeader::from_token)?;
    let group = tokens.iter().find_map(GroupHeader::from_token)?;
    Some((header.version, group.functional_id, group.version))
}

/// Print the relational layout of each map
pub fn run_sql(loader: &MapLoader, maps: &[String], json: bool) -> anyhow::Result<u8> {
    let mut stdout = std::io::stdout().lock();
    for id in maps {
        let map = loader.load_map(id)?;
        let tables = emit(&map);
        info!(map = map.id(), tables = tables.len(), "Emitted relational layout");
        if json {
            serde_json::to_writer_pretty(&mut stdout, &tables)?;
            writeln!(stdout)?;
        } else {
            write!(stdout, "{}", render(&tables))?;
        }
    }
    stdout.flush()?;
    Ok(EXIT_VALID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edi_ir::{Field, Position};

    fn token(code: &str, values: &[&str]) -> SegmentToken {
        let fields = values.iter().map(|v| Field::Simple((*v).to_string())).collect();
        SegmentToken::new(code, fields, Position::default())
    }

    #[test]
    fn test_envelope_keys() {
        let mut isa: Vec<&str> = vec![""; 16];
        isa[11] = "00401";
        let tokens = vec![
            token("ISA", &isa),
            token(
                "GS",
                &["HC", "SENDER", "RECEIVER", "20030101", "1253", "1", "X", "004010X098A1"],
            ),
        ];
        assert_eq!(
            envelope_keys(&tokens),
            Some((
                "00401".to_string(),
                "HC".to_string(),
                "004010X098A1".to_string()
            ))
        );
    }

    #[test]
    fn test_envelope_keys_need_a_group() {
        let isa: Vec<&str> = vec!["00"; 16];
        assert_eq!(envelope_keys(&[token("ISA", &isa)]), None);
    }
}
