mod archive;
mod batch;
mod classify;
mod config;
mod fields;
mod heuristics;
mod llm_extract;
mod normalize;
mod oracle;
mod pdf_extract;
mod pipeline;
mod reconcile;

use clap::{Parser, Subcommand};
use classify::RoleSet;
use config::{Config, OracleBackend};
use fields::DocumentDetails;
use pdf_extract::PdfDocument;
use pipeline::PipelineOptions;
use reconcile::Reconciliation;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cross-check carton count, gross weight and volume across a bill of lading,
/// a commercial invoice and a packing list.
#[derive(Parser)]
#[command(name = "shipcheck", version)]
struct Cli {
    /// Config file, defaults apply when it does not exist
    #[arg(long, short, global = true, default_value = "shipcheck.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which document slot each filename is assigned to
    Classify {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Compare already extracted (or hand corrected) details from a JSON file
    Compare { file: PathBuf },
    /// Extract the fields of a single PDF
    Extract { file: PathBuf },
    /// Classify, extract and cross-check a set of PDFs
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Cross-check the documents merged into one PDF
    Combined { file: PathBuf },
    /// Check every ZIP and PDF in the batch input folder
    Batch {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Switch the extraction backend in the config file
    UseBackend { backend: OracleBackend },
}

#[derive(Serialize)]
struct CompareOutput<'a> {
    results: Reconciliation,
    details: &'a RoleSet<Option<DocumentDetails>>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logs go to stderr, stdout is reserved for JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Classify { names } => {
            let classification = classify::classify(&names);
            info!(
                assigned = classification.assigned(),
                unused = classification.unused.len(),
                "Classified"
            );
            print_json(&classification)?;
        }
        Command::Compare { file } => {
            let details: RoleSet<Option<DocumentDetails>> =
                serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let results = reconcile::compare_roles(&details);
            print_json(&CompareOutput {
                results,
                details: &details,
            })?;
        }
        Command::Extract { file } => {
            let oracle = oracle::build_oracle(&cfg.oracle)?;
            let doc = PdfDocument::from_path(&file)?;
            let details = normalize::sanitize(oracle.extract(&doc).await?);
            print_json(&details)?;
        }
        Command::Check { files } => {
            let oracle = oracle::build_oracle(&cfg.oracle)?;
            let docs = files
                .iter()
                .map(PdfDocument::from_path)
                .collect::<Result<Vec<_>, _>>()?;
            let opts = PipelineOptions::from(&cfg.batch);
            let outcome = pipeline::check_documents(oracle, docs, &opts).await?;
            print_json(&outcome)?;
        }
        Command::Combined { file } => {
            let oracle = oracle::build_oracle(&cfg.oracle)?;
            let doc = PdfDocument::from_path(&file)?;
            let outcome = pipeline::check_combined(oracle, &doc).await?;
            print_json(&outcome)?;
        }
        Command::Batch {
            input,
            output,
            limit,
        } => {
            let mut batch_cfg = cfg.batch.clone();
            if let Some(input) = input {
                batch_cfg.input_dir = input;
            }
            if let Some(output) = output {
                batch_cfg.output = output;
            }
            if let Some(limit) = limit {
                batch_cfg.limit = limit;
            }

            let oracle = oracle::build_oracle(&cfg.oracle)?;
            let report = batch::run_batch(oracle, &batch_cfg).await?;
            batch::write_report(&report, &batch_cfg.output)?;
            print_json(&report.summary)?;
        }
        Command::UseBackend { backend } => {
            Config::update_backend(&cli.config, backend)?;
            info!(backend = backend.as_str(), config = %cli.config.display(), "Backend updated");
        }
    }

    Ok(())
}
