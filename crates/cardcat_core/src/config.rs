use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error_handler::CardcatError;

pub const DEFAULT_API_BASE_URL: &str = "https://db.ygoprodeck.com/api/v7";

/// Characters Excel refuses in worksheet names.
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Timeout and retry policy for catalog requests.
///
/// The defaults (no timeout, no retries) mean an unresponsive catalog blocks
/// the run until the process is killed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestPolicy {
    pub timeout_secs: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

impl RequestPolicy {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total attempts, including the first one.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// What to do when a single card fails to render into the document template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateErrorPolicy {
    /// Log a warning and leave the card's page out of the document.
    #[default]
    Skip,
    /// Fail the whole run.
    Abort,
}

/// Which engine turns the paginated HTML document into a PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PdfEngineConfig {
    /// Text-only renderer bundled with cardcat.
    #[default]
    Builtin,
    /// External converter that reads HTML on stdin and writes PDF on stdout,
    /// e.g. `wkhtmltopdf - -`.
    Command { program: String, args: Vec<String> },
}

// ---------------------------------------------------------------------------
// CardcatConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.cardcat/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardcatConfig {
    pub api_base_url: String,
    pub output_dir: PathBuf,
    /// HTML template for PDF pages. `None` uses the built-in template.
    pub template_path: Option<PathBuf>,
    pub sheet_name: String,
    pub request: RequestPolicy,
    pub template_errors: TemplateErrorPolicy,
    pub pdf_engine: PdfEngineConfig,
    pub log_level: String,
    /// Overrides `~/.cardcat/logs`.
    pub logs_dir: Option<PathBuf>,
}

impl Default for CardcatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            output_dir: PathBuf::from("./data"),
            template_path: None,
            sheet_name: "Cards".into(),
            request: RequestPolicy::default(),
            template_errors: TemplateErrorPolicy::default(),
            pdf_engine: PdfEngineConfig::default(),
            log_level: "info".into(),
            logs_dir: None,
        }
    }
}

impl CardcatConfig {
    /// Returns the base config directory: `~/.cardcat/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".cardcat"))
    }

    /// Returns the config file path: `~/.cardcat/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory, honouring `logs_dir` when set.
    pub fn logs_dir(&self) -> Result<PathBuf> {
        match &self.logs_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::base_dir()?.join("logs")),
        }
    }

    /// Loads config from `~/.cardcat/config.json`, creating it if missing.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from_path(&path)
    }

    /// Load config from a specific file path, writing defaults there if it
    /// does not exist yet.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self = serde_json::from_str(&content).map_err(|e| {
                CardcatError::Config(format!("Failed to parse {}: {e}", path.display()))
            })?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            config
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CardcatError> {
        if self.api_base_url.trim().is_empty() {
            return Err(CardcatError::Config("api_base_url is empty".into()));
        }
        validate_sheet_name(&self.sheet_name)?;
        if let PdfEngineConfig::Command { program, .. } = &self.pdf_engine {
            if program.trim().is_empty() {
                return Err(CardcatError::Config("pdf_engine.program is empty".into()));
            }
        }
        Ok(())
    }
}

/// Excel sheet names are 1–31 characters, without `[]:*?/\`, and may not
/// start or end with an apostrophe.
pub fn validate_sheet_name(name: &str) -> Result<(), CardcatError> {
    let len = name.chars().count();
    if len == 0 || len > 31 {
        return Err(CardcatError::Config(format!(
            "sheet name must be 1-31 characters, got {len}"
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(CardcatError::Config(format!(
            "sheet name {name:?} contains forbidden character {c:?}"
        )));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(CardcatError::Config(format!(
            "sheet name {name:?} may not start or end with an apostrophe"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CardcatConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.template_errors, TemplateErrorPolicy::Skip);
        assert_eq!(config.request.timeout(), None);
        assert_eq!(config.request.attempts(), 1);
    }

    #[test]
    fn load_from_missing_path_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let config = CardcatConfig::load_from_path(&path).unwrap();
        assert_eq!(config, CardcatConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn load_partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "sheet_name": "Blue-Eyes",
                "request": { "timeout_secs": 15, "retries": 2 },
                "template_errors": "abort",
                "pdf_engine": { "kind": "command", "program": "wkhtmltopdf", "args": ["-", "-"] }
            }"#,
        )
        .unwrap();

        let config = CardcatConfig::load_from_path(&path).unwrap();
        assert_eq!(config.sheet_name, "Blue-Eyes");
        assert_eq!(config.request.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.request.attempts(), 3);
        assert_eq!(config.request.retry_delay_ms, 500);
        assert_eq!(config.template_errors, TemplateErrorPolicy::Abort);
        assert_eq!(
            config.pdf_engine,
            PdfEngineConfig::Command {
                program: "wkhtmltopdf".into(),
                args: vec!["-".into(), "-".into()],
            }
        );
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn load_rejects_invalid_sheet_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{ "sheet_name": "a/b" }"#).unwrap();

        assert!(CardcatConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn load_rejects_malformed_json_as_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = CardcatConfig::load_from_path(&path).unwrap_err();
        assert_eq!(
            crate::error_handler::classify_error(&err),
            Some(crate::error_handler::ErrorCategory::Config)
        );
    }

    #[test]
    fn save_and_reload_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let config = CardcatConfig {
            output_dir: PathBuf::from("/srv/exports"),
            template_path: Some(PathBuf::from("card.html")),
            ..Default::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = CardcatConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn sheet_name_rules() {
        assert!(validate_sheet_name("Cards").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
        assert!(validate_sheet_name("what?").is_err());
        assert!(validate_sheet_name("'quoted").is_err());
    }

    #[test]
    fn empty_command_engine_rejected() {
        let config = CardcatConfig {
            pdf_engine: PdfEngineConfig::Command {
                program: " ".into(),
                args: vec![],
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_logs_dir_wins() {
        let config = CardcatConfig {
            logs_dir: Some(PathBuf::from("/var/log/cardcat")),
            ..Default::default()
        };
        assert_eq!(
            config.logs_dir().unwrap(),
            PathBuf::from("/var/log/cardcat")
        );
    }
}
