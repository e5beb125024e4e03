//! Error types for the Pulse backend
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Pulse operations
#[derive(Error, Debug)]
pub enum PulseError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP request error (outbound)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// External API returned an application-level error
    #[error("External API error ({service}): {message}")]
    ExternalApi { service: String, message: String },

    /// LLM API request failed
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM API rejected the request due to rate limiting
    #[error("LLM rate limited: {0}")]
    LlmRateLimited(String),

    /// LLM API request exceeded its deadline
    #[error("LLM request timed out after {0}s")]
    LlmTimeout(u64),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<anyhow::Error> for PulseError {
    fn from(err: anyhow::Error) -> Self {
        PulseError::Other(err.to_string())
    }
}

impl From<libsql::Error> for PulseError {
    fn from(err: libsql::Error) -> Self {
        PulseError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PulseError::NotFound("journey abc".to_string());
        assert_eq!(err.to_string(), "Not found: journey abc");

        let err = PulseError::ExternalApi {
            service: "linear".to_string(),
            message: "team not found".to_string(),
        };
        assert_eq!(err.to_string(), "External API error (linear): team not found");
    }

    #[test]
    fn test_llm_error_variants_are_distinguishable() {
        let rate = PulseError::LlmRateLimited("429".to_string());
        let timeout = PulseError::LlmTimeout(30);
        let generic = PulseError::LlmApi("boom".to_string());

        assert!(matches!(rate, PulseError::LlmRateLimited(_)));
        assert!(matches!(timeout, PulseError::LlmTimeout(30)));
        assert!(matches!(generic, PulseError::LlmApi(_)));
    }

    #[test]
    fn test_serde_error_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: PulseError = bad.unwrap_err().into();
        assert!(matches!(err, PulseError::Serialization(_)));
    }
}
