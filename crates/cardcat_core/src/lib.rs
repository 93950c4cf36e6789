pub mod card;
pub mod config;
pub mod error_handler;
pub mod logging;

pub use card::{
    Card, CardImage, CardPrice, CardSet, CatalogResponse, IngestRow, validate_unique_ids,
};
pub use config::{CardcatConfig, PdfEngineConfig, RequestPolicy, TemplateErrorPolicy};
pub use error_handler::{CardcatError, ErrorCategory, classify_error};
