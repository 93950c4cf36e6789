//! The two runs the binary offers: render an archetype from the catalog, or
//! turn a local name/address file into a text report.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cardcat_catalog::CatalogClient;
use cardcat_core::{CardcatConfig, CardcatError};
use cardcat_docs::{
    PdfEngine, RenderContext, RenderSummary, RenderTarget, read_rows, render_cards, write_report,
};
use tracing::{debug, info};

/// File name of the ingest report inside `output_dir`.
pub const REPORT_FILE: &str = "report.log";

/// Lowercase, with every run of non-alphanumerics collapsed to `-`.
pub fn archetype_slug(archetype: &str) -> String {
    let mut slug = String::with_capacity(archetype.len());
    for c in archetype.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "cards".to_string()
    } else {
        slug.to_string()
    }
}

pub fn default_fetch_path(output_dir: &Path, archetype: &str, target: RenderTarget) -> PathBuf {
    output_dir.join(format!("{}.{}", archetype_slug(archetype), target.extension()))
}

/// Create whatever directories `path` needs before the artifact is written.
fn ensure_parent_dir(path: &Path) -> Result<(), CardcatError> {
    match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| CardcatError::persist(parent, e))
        }
        None => Ok(()),
    }
}

/// Fetch `archetype` and render it to `target`.
pub fn run_fetch(
    config: &CardcatConfig,
    client: &CatalogClient,
    engine: &dyn PdfEngine,
    archetype: &str,
    target: RenderTarget,
    output: Option<PathBuf>,
) -> Result<RenderSummary> {
    let fetch = client
        .fetch_archetype(archetype)
        .with_context(|| format!("Failed to fetch archetype '{archetype}'"))?;
    debug!(archetype, status = fetch.status, "catalog answered");
    let cards = fetch.response.data;

    let path = output.unwrap_or_else(|| default_fetch_path(&config.output_dir, archetype, target));
    ensure_parent_dir(&path)?;
    let ctx = RenderContext {
        title: archetype.trim().to_string(),
        sheet_name: &config.sheet_name,
        template_path: config.template_path.as_deref(),
        template_errors: config.template_errors,
        engine,
    };

    let summary = render_cards(&cards, target, &ctx, &path)?;
    info!(
        archetype,
        cards = cards.len(),
        written = summary.written,
        skipped = summary.skipped.len(),
        path = %path.display(),
        "fetch complete"
    );
    Ok(summary)
}

/// Read `input` and write one report line per data row. Returns the line count.
pub fn run_ingest(config: &CardcatConfig, input: &Path, output: Option<PathBuf>) -> Result<usize> {
    let data = std::fs::read(input)
        .map_err(CardcatError::from)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rows = read_rows(&data, &file_name)
        .with_context(|| format!("Failed to read rows from {}", input.display()))?;

    let path = output.unwrap_or_else(|| config.output_dir.join(REPORT_FILE));
    ensure_parent_dir(&path)?;
    let file = File::create(&path).map_err(|e| CardcatError::persist(&path, e))?;
    let mut writer = BufWriter::new(file);
    let lines = write_report(&rows, &mut writer)?;
    writer.flush().map_err(|e| CardcatError::persist(&path, e))?;

    info!(input = %input.display(), report = %path.display(), lines, "ingest complete");
    Ok(lines)
}
