//! cardcat: fetch trading-card archetypes and render them, or turn local
//! name/address sheets into text reports.

mod commands;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cardcat_catalog::CatalogClient;
use cardcat_core::{CardcatConfig, classify_error, logging};
use cardcat_docs::{RenderTarget, engine_from_config};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "cardcat",
    version,
    about = "Render card-catalog archetypes and local sheets",
    long_about = "cardcat - fetch every card of an archetype from the YGOPRODeck catalog and \
                  render it as a text report, CSV, XLSX, HTML or PDF, or turn a local \
                  name/address CSV or XLSX file into a line report."
)]
struct Cli {
    /// Config file (default: ~/.cardcat/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an archetype from the catalog and render it
    Fetch {
        /// Archetype name, e.g. "Blue-Eyes"
        archetype: String,

        /// Output format: text, csv, xlsx, pdf or html
        #[arg(short, long, default_value = "pdf")]
        format: RenderTarget,

        /// Output file (default: <output_dir>/<archetype>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read a CSV or XLSX file of name/address rows into a text report
    Ingest {
        /// Input file path
        input: PathBuf,

        /// Report file (default: <output_dir>/report.log)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<CardcatConfig> {
    match path {
        Some(path) => CardcatConfig::load_from_path(path),
        None => CardcatConfig::load(),
    }
}

fn run(command: Commands, config: &CardcatConfig) -> Result<()> {
    match command {
        Commands::Fetch {
            archetype,
            format,
            output,
        } => {
            let client = CatalogClient::new(config.api_base_url.clone(), config.request.clone())?;
            let engine = engine_from_config(&config.pdf_engine);
            let summary = commands::run_fetch(
                config,
                &client,
                engine.as_ref(),
                &archetype,
                format,
                output,
            )?;
            if !summary.skipped.is_empty() {
                info!(
                    format = %summary.target,
                    skipped = ?summary.skipped,
                    "some cards were left out"
                );
            }
        }
        Commands::Ingest { input, output } => {
            commands::run_ingest(config, &input, output)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref());
    let mut log_config = loaded
        .as_ref()
        .map_or_else(|_| CardcatConfig::default(), Clone::clone);
    if cli.verbose {
        log_config.log_level = "debug".into();
    }
    let _log_guard = match logging::init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("cardcat: file logging unavailable: {e:#}");
            None
        }
    };
    info!("Starting cardcat v{VERSION}");

    match loaded.and_then(|config| run(cli.command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(category = ?classify_error(&e), "{e:#}");
            ExitCode::FAILURE
        }
    }
}
