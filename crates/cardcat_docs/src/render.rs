//! Dispatch from a [`RenderTarget`] to the matching writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use cardcat_core::{Card, CardcatError, TemplateErrorPolicy};
use tracing::info;

use crate::html::{CardTemplate, render_document};
use crate::pdf::PdfEngine;

/// Artifact kinds a card list can be rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    TextReport,
    DelimitedText,
    Spreadsheet,
    PaginatedDocument,
    Html,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 5] = [
        RenderTarget::TextReport,
        RenderTarget::DelimitedText,
        RenderTarget::Spreadsheet,
        RenderTarget::PaginatedDocument,
        RenderTarget::Html,
    ];

    /// Default file extension, also the CLI name.
    pub fn extension(&self) -> &'static str {
        match self {
            RenderTarget::TextReport => "txt",
            RenderTarget::DelimitedText => "csv",
            RenderTarget::Spreadsheet => "xlsx",
            RenderTarget::PaginatedDocument => "pdf",
            RenderTarget::Html => "html",
        }
    }

    fn cli_name(&self) -> &'static str {
        match self {
            RenderTarget::TextReport => "text",
            other => other.extension(),
        }
    }
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for RenderTarget {
    type Err = CardcatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.cli_name() == wanted || (wanted == "txt" && *t == RenderTarget::TextReport))
            .ok_or_else(|| {
                CardcatError::Config(format!(
                    "unknown output format '{s}' (expected text, csv, xlsx, pdf or html)"
                ))
            })
    }
}

/// Run-wide settings the renderers need.
pub struct RenderContext<'a> {
    /// Document title for PDF and HTML output.
    pub title: String,
    pub sheet_name: &'a str,
    pub template_path: Option<&'a Path>,
    pub template_errors: TemplateErrorPolicy,
    pub engine: &'a dyn PdfEngine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub target: RenderTarget,
    /// Records written: lines, rows or pages depending on the target.
    pub written: usize,
    pub skipped: Vec<i64>,
}

/// Render `cards` to `target` and write the artifact at `path`.
pub fn render_cards(
    cards: &[Card],
    target: RenderTarget,
    ctx: &RenderContext<'_>,
    path: &Path,
) -> Result<RenderSummary> {
    let mut skipped = Vec::new();

    let written = match target {
        RenderTarget::TextReport => {
            let mut writer = BufWriter::new(create(path)?);
            crate::report::write_report(cards, &mut writer)?
        }
        RenderTarget::DelimitedText => {
            write_csv_artifact(cards, BufWriter::new(create(path)?), path)?;
            cards.len()
        }
        RenderTarget::Spreadsheet => {
            crate::xlsx::save_cards_xlsx(cards, ctx.sheet_name, path)?;
            cards.len()
        }
        RenderTarget::PaginatedDocument | RenderTarget::Html => {
            let template = CardTemplate::from_path_or_builtin(ctx.template_path)?;
            let document = render_document(&ctx.title, cards, &template, ctx.template_errors)?;
            skipped = document.skipped;

            let bytes = if target == RenderTarget::Html {
                document.html.into_bytes()
            } else {
                ctx.engine
                    .convert(&ctx.title, &document.html)
                    .with_context(|| format!("PDF engine `{}` failed", ctx.engine.name()))?
            };
            std::fs::write(path, bytes).map_err(|e| CardcatError::persist(path, e))?;
            document.pages
        }
    };

    if written + skipped.len() != cards.len() {
        bail!(
            "rendered {written} of {} cards with {} skipped",
            cards.len(),
            skipped.len()
        );
    }

    info!(
        format = %target,
        path = %path.display(),
        written,
        skipped = skipped.len(),
        "rendered cards"
    );
    Ok(RenderSummary {
        target,
        written,
        skipped,
    })
}

fn create(path: &Path) -> Result<File, CardcatError> {
    File::create(path).map_err(|e| CardcatError::persist(path, e))
}

/// Any failure while writing or flushing is a persist error on `path`.
fn write_csv_artifact<W: Write>(cards: &[Card], writer: W, path: &Path) -> Result<(), CardcatError> {
    let mut writer = crate::csv::write_cards_csv(cards, writer)
        .map_err(|e| CardcatError::persist(path, std::io::Error::other(format!("{e:#}"))))?;
    writer.flush().map_err(|e| CardcatError::persist(path, e))
}
