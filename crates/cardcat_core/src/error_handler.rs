use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type shared by every cardcat crate.
#[derive(Error, Debug)]
pub enum CardcatError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Catalog returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode catalog response: {0}")]
    Decode(String),

    #[error("Unsupported input (detected {mime}, extension {extension:?})")]
    Classification { mime: String, extension: String },

    #[error("Malformed row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("Malformed input file: {0}")]
    Malformed(String),

    #[error("Template failed for card {card_id}: {message}")]
    Template { card_id: i64, message: String },

    #[error("Failed to load template: {0}")]
    TemplateLoad(String),

    #[error("Failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification used for the final log entry of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The catalog service could not be reached.
    Network,
    /// The catalog answered, but not with usable data.
    Remote,
    /// A local input file was unsupported or malformed.
    Input,
    /// A single card could not be rendered.
    Template,
    /// An artifact or template file could not be read or written.
    Storage,
    /// Invalid or missing configuration.
    Config,
}

impl CardcatError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Network,
            Self::Status { .. } | Self::Decode(_) => ErrorCategory::Remote,
            Self::Classification { .. } | Self::Parse { .. } | Self::Malformed(_) => {
                ErrorCategory::Input
            }
            Self::Template { .. } => ErrorCategory::Template,
            Self::TemplateLoad(_) | Self::Persist { .. } | Self::Io(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Only per-card template failures may be skipped; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Template { .. })
    }

    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

/// Classify an `anyhow::Error` by looking for a [`CardcatError`] anywhere in its chain.
pub fn classify_error(error: &anyhow::Error) -> Option<ErrorCategory> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CardcatError>())
        .map(CardcatError::category)
}
