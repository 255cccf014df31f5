//! # edi-cli
//!
//! Command-line front end for X12 validation.
//!
//! `edi validate` checks interchanges against a map and prints one
//! diagnostic per violation. `edi sql` prints the relational layout of a
//! map as T-SQL.

mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use commands::{EXIT_FATAL, ValidateJob};
use config::Settings;
use edi_schema::MapLoader;
use edi_validation::{AcceptAll, Charset, CodeListRegistry, CodeSetLookup, Format};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "edi")]
#[command(about = "X12 validation and relational layout")]
#[command(version)]
struct Cli {
    /// Path to a settings file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to search for maps; repeatable
    #[arg(short = 'm', long = "map-path", global = true)]
    map_path: Vec<PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Reload maps from disk instead of using cached copies
    #[arg(short, long, global = true)]
    force_reload: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate X12 interchanges
    Validate(ValidateArgs),

    /// Print the relational layout of maps as T-SQL
    Sql(SqlArgs),
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Interchange files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Map id; chosen from the ISA/GS headers when omitted
    #[arg(long)]
    map: Option<String>,

    /// External code list file (YAML or JSON)
    #[arg(long)]
    codes: Option<PathBuf>,

    /// Stop at the first segment that matches nothing
    #[arg(long)]
    strict: bool,

    /// Character set for AN and ID elements (basic, extended)
    #[arg(long)]
    charset: Option<Charset>,

    /// Report format (text, json)
    #[arg(long, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Args, Debug)]
struct SqlArgs {
    /// Map ids
    #[arg(required = true)]
    maps: Vec<String>,

    /// Print the table definitions as JSON instead of DDL
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let map_paths = settings.map_paths(&cli.map_path);
    tracing::debug!(?map_paths, "Map search path");
    let loader = Arc::new(MapLoader::new(map_paths).force_reload(cli.force_reload));

    match cli.command {
        Commands::Validate(args) => {
            let codes: Arc<dyn CodeSetLookup> = match settings.code_lists(args.codes.as_deref()) {
                Some(path) => Arc::new(CodeListRegistry::from_file(&path)?),
                None => Arc::new(AcceptAll),
            };
            let job = ValidateJob {
                files: args.files,
                map: args.map,
                codes,
                config: settings.validation(args.strict, args.charset),
                format: args.format,
            };
            commands::run_validate(loader, job).await
        }
        Commands::Sql(args) => commands::run_sql(&loader, &args.maps, args.json),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from([
            "edi",
            "-m",
            "maps",
            "validate",
            "a.x12",
            "b.x12",
            "--map",
            "837.4010.X098.A1",
            "--strict",
            "--charset",
            "basic",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.map_path, vec![PathBuf::from("maps")]);
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.map.as_deref(), Some("837.4010.X098.A1"));
        assert!(args.strict);
        assert_eq!(args.charset, Some(Charset::Basic));
        assert_eq!(args.format, Format::Json);
    }

    #[test]
    fn test_validate_defaults() {
        let cli = Cli::try_parse_from(["edi", "validate", "claim.x12"]).unwrap();
        let Commands::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert!(args.map.is_none());
        assert!(!args.strict);
        assert_eq!(args.charset, None);
        assert_eq!(args.format, Format::Text);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["edi", "sql", "837", "-vv", "-f", "--map-path", "a", "-m", "b"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.force_reload);
        assert_eq!(cli.map_path, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(matches!(cli.command, Commands::Sql(ref args) if args.maps == ["837"]));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["edi", "validate", "a.x12", "--format", "xml"]).is_err());
        assert!(Cli::try_parse_from(["edi", "validate", "a.x12", "--charset", "latin1"]).is_err());
        assert!(Cli::try_parse_from(["edi", "validate"]).is_err());
        assert!(Cli::try_parse_from(["edi", "-q", "-v", "sql", "837"]).is_err());
    }
}
