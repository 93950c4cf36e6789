//! Input detection and reading, plus every output format cardcat renders.

pub mod csv;
pub mod detect;
pub mod html;
pub mod ingest;
pub mod pdf;
pub mod render;
pub mod report;
pub mod workbook;
pub mod xlsx;

pub use detect::{SourceFormat, detect_format};
pub use html::{CardTemplate, PAGE_BREAK};
pub use ingest::read_rows;
pub use pdf::{BuiltinPdfEngine, CommandPdfEngine, PdfEngine, engine_from_config};
pub use render::{RenderContext, RenderSummary, RenderTarget, render_cards};
pub use report::{ReportEntry, write_report};
