// src/errors.rs
use thiserror::Error;

/// Everything that can go wrong while asking a single provider.
///
/// These never escape an adapter: the aggregator turns each one into the
/// display string of that provider's field.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Missing {0}")]
    MissingCredential(&'static str),

    #[error("{message}")]
    Http { status: u16, message: String },

    /// Transport failure. Stored without its URL, which can carry a query-string key.
    #[error("{0}")]
    Request(#[source] reqwest::Error),

    #[error("{0}")]
    MalformedResponse(String),

    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Blocked(String),
}

impl ProviderError {
    /// Whether a reduced-budget second attempt is worth making.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Request(e.without_url())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failures of the service itself, as opposed to a single provider.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("No providers configured")]
    NoProviders,
}

/// Best-effort human readable message from a provider's error body.
///
/// Tries `error.message`, then a bare `error` string, then a top-level
/// `message`, then the raw body, and finally falls back to `HTTP <code>`.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let extracted = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .or_else(|| json.get("error").and_then(|e| e.as_str()))
            .or_else(|| json.get("message").and_then(|m| m.as_str()));
        if let Some(message) = extracted {
            if !message.trim().is_empty() {
                return message.trim().to_string();
            }
        }
    }

    let raw = body.trim();
    if raw.is_empty() {
        format!("HTTP {}", status)
    } else {
        raw.to_string()
    }
}
