use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info, warn};

use cardcat_core::{CardcatError, CatalogResponse, RequestPolicy, validate_unique_ids};

/// Longest slice of a non-JSON error body carried into the error message.
const MAX_ERROR_BODY: usize = 200;

/// A decoded catalog answer together with the HTTP status it arrived with.
#[derive(Debug, Clone)]
pub struct CatalogFetch {
    pub status: u16,
    pub response: CatalogResponse,
}

/// Blocking client for the card catalog's `cardinfo.php` endpoint.
///
/// Built once at startup and handed to whatever needs it.
pub struct CatalogClient {
    base_url: String,
    policy: RequestPolicy,
    client: Client,
}

impl CatalogClient {
    /// Create a client pointing at `base_url` (e.g. `https://db.ygoprodeck.com/api/v7`).
    pub fn new(base_url: impl Into<String>, policy: RequestPolicy) -> Result<Self, CardcatError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CardcatError::Config("catalog base URL is empty".into()));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("cardcat/", env!("CARGO_PKG_VERSION"))),
        );

        // The blocking client defaults to a 30s timeout; pass the policy's
        // value through even when it is `None`.
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(policy.timeout())
            .build()
            .map_err(|e| CardcatError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            policy,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// Full URL of the card-info endpoint, without the query string.
    pub fn endpoint(&self) -> String {
        format!("{}/cardinfo.php", self.base_url)
    }

    /// Fetch every card of `archetype` in one request.
    ///
    /// Anything but `200 OK` is an error. Transport errors and 5xx answers are
    /// retried only as far as the [`RequestPolicy`] allows.
    pub fn fetch_archetype(&self, archetype: &str) -> Result<CatalogFetch, CardcatError> {
        let archetype = archetype.trim();
        if archetype.is_empty() {
            return Err(CardcatError::Config("archetype must not be empty".into()));
        }

        let url = self.endpoint();
        let attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            match self.fetch_once(&url, archetype) {
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    warn!(attempt, attempts, error = %e, "catalog request failed, retrying");
                    std::thread::sleep(self.policy.retry_delay());
                    attempt += 1;
                }
                Ok(fetch) => {
                    info!(
                        archetype,
                        cards = fetch.response.data.len(),
                        "fetched archetype from catalog"
                    );
                    return Ok(fetch);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_once(&self, url: &str, archetype: &str) -> Result<CatalogFetch, CardcatError> {
        debug!(url = %url, archetype, "requesting card info");

        let response = self
            .client
            .get(url)
            .query(&[("archetype", archetype)])
            .send()
            .map_err(|e| CardcatError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| CardcatError::Transport(format!("failed to read body: {e}")))?;

        if status != StatusCode::OK {
            return Err(CardcatError::Status {
                status: status.as_u16(),
                message: api_error_message(status, &body),
            });
        }

        let response: CatalogResponse =
            serde_json::from_str(&body).map_err(|e| CardcatError::Decode(e.to_string()))?;
        validate_unique_ids(&response.data)?;

        Ok(CatalogFetch {
            status: status.as_u16(),
            response,
        })
    }
}

fn is_retryable(error: &CardcatError) -> bool {
    match error {
        CardcatError::Transport(_) => true,
        CardcatError::Status { status, .. } => *status >= 500,
        _ => false,
    }
}

/// The catalog answers failed lookups with `{"error": "..."}`.
fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
