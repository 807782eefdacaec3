use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {message}")]
    Llm { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure of a single lookup attempt against one provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupFailure {
    /// The provider asked us to back off, optionally saying for how long.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Connect/read timeout, dropped connection or a 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A 4xx other than 429; retrying cannot help.
    #[error("client error {status}: {body}")]
    PermanentClient { status: u16, body: String },

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl LookupFailure {
    /// Short label for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            LookupFailure::RateLimited { .. } => "rate_limited",
            LookupFailure::Transient(_) => "transient",
            LookupFailure::PermanentClient { .. } => "permanent_client",
            LookupFailure::Unexpected(_) => "unexpected",
        }
    }

    /// Classify a transport-level reqwest error.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            LookupFailure::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            LookupFailure::from_status(status.as_u16(), None, String::new())
        } else {
            LookupFailure::Unexpected(err.to_string())
        }
    }

    /// Classify a non-success HTTP status. Returns `Unexpected` for codes that are not errors.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => LookupFailure::RateLimited { retry_after },
            400..=499 => LookupFailure::PermanentClient { status, body },
            500..=599 => LookupFailure::Transient(format!("server error {}", status)),
            other => LookupFailure::Unexpected(format!("unexpected status {}", other)),
        }
    }
}
