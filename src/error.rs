//! AIP Proxy error types.
//!
//! Only bootstrap failures are fatal. Everything raised while handling a
//! request has a documented fail-open or gateway-failure outcome decided at
//! the call site:
//!
//! - [`ProxyError::Parse`]: forward the original body unchanged
//! - [`ProxyError::CacheSerialization`]: treat as a miss / skip the store
//! - [`ProxyError::Network`] / [`ProxyError::Upstream`]: answer with a
//!   gateway error instead of dropping the connection

use thiserror::Error;

/// AIP Proxy errors.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Chat request body is not valid JSON of the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// Cache key or payload could not be serialized.
    #[error("Cache serialization error: {0}")]
    CacheSerialization(#[source] serde_json::Error),

    /// Could not reach the upstream (connect failure, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered but the exchange failed midway.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        ProxyError::Config(format!("Failed to parse config: {err}"))
    }
}
