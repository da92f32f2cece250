use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use audesp_sync::normalize::{self, ExportOptions};
use audesp_sync::{Document, Validator};

#[derive(Parser)]
#[command(name = "audesp-sync", version, about = "Normalize, validate and diff AUDESP report documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the empty report template
    Template(OutputArgs),
    /// Import a document and print its validation report
    Validate(InputArgs),
    /// Import a document and print the normalized export
    Normalize(NormalizeArgs),
    /// Show leaf-level differences between two documents
    Diff(DiffArgs),
}

#[derive(Parser)]
struct OutputArgs {
    /// Compact output instead of two-space indentation
    #[arg(long)]
    compact: bool,
}

#[derive(Parser)]
struct InputArgs {
    /// Document to read; standard input when omitted
    #[arg(value_name = "PATH")]
    input: Option<PathBuf>,
    /// Skip the person tax ID checksum
    #[arg(long)]
    skip_cpf_check: bool,
}

#[derive(Parser)]
struct NormalizeArgs {
    /// Document to read; standard input when omitted
    #[arg(value_name = "PATH")]
    input: Option<PathBuf>,
    /// Keep empty lists, nulls and empty strings
    #[arg(long)]
    include_empty: bool,
    /// Omit the metadata block
    #[arg(long)]
    no_meta: bool,
    #[arg(long)]
    compact: bool,
}

#[derive(Parser)]
struct DiffArgs {
    #[arg(value_name = "BEFORE")]
    before: PathBuf,
    #[arg(value_name = "AFTER")]
    after: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Template(args) => {
            let options = ExportOptions {
                include_empty: true,
                pretty: !args.compact,
                include_meta: false,
            };
            println!("{}", normalize::export(&Document::template(), &options)?);
        }
        Commands::Validate(args) => {
            let document = load(args.input.as_ref())?;
            let validator = if args.skip_cpf_check {
                Validator::new().with_cpf_check(|_| true)
            } else {
                Validator::new()
            };
            let report = validator.validate(&document);
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                bail!("{} validation error(s)", report.errors.len());
            }
        }
        Commands::Normalize(args) => {
            let document = load(args.input.as_ref())?;
            let options = ExportOptions {
                include_empty: args.include_empty,
                pretty: !args.compact,
                include_meta: !args.no_meta,
            };
            println!("{}", normalize::export(&document, &options)?);
        }
        Commands::Diff(args) => {
            let before = load(Some(&args.before))?;
            let after = load(Some(&args.after))?;
            for change in normalize::diff(before.as_value(), after.as_value(), "") {
                println!("{}", serde_json::to_string(&change)?);
            }
        }
    }

    Ok(())
}

/// Read and import a document, printing import warnings to stderr
fn load(input: Option<&PathBuf>) -> Result<Document> {
    let raw = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read standard input")?;
            buffer
        }
    };

    let report = normalize::import(&raw);
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    for error in &report.errors {
        eprintln!("error: {}", error);
    }
    match report.data {
        Some(document) => Ok(document),
        None => bail!("import failed with {} error(s)", report.errors.len()),
    }
}
