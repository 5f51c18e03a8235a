//! Error types for the tidemark domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` aggregates them.
//!
//! | Kind                     | Type                         | Policy                              |
//! |--------------------------|------------------------------|-------------------------------------|
//! | InputValidationError     | [`Error::InvalidInput`]      | surfaced as 4xx, never retried      |
//! | UpstreamGenerationError  | [`ProviderError`]            | surfaced for synthesis only         |
//! | RetrievalFailure         | [`RetrievalError`]           | recovered: empty evidence           |
//! | Session store failure    | [`ContextError`]             | surfaced                            |
//!
//! Malformed model output and invalid action entries never become errors;
//! they are absorbed by the response parser and the action policy.

use thiserror::Error;

/// The top-level error type for all tidemark operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Upstream generation / embedding ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Session context store ---
    #[error("Context store error: {0}")]
    Context(#[from] ContextError),

    // --- Evidence retrieval ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Caller input ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector store unreachable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl From<ProviderError> for RetrievalError {
    fn from(err: ProviderError) -> Self {
        RetrievalError::EmbeddingFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn timeout_is_an_upstream_error() {
        let err: Error = ProviderError::Timeout("synthesis after 60s".into()).into();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout(_))));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn embedding_failure_becomes_retrieval_error() {
        let err: RetrievalError = ProviderError::Network("connection reset".into()).into();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
        assert!(err.to_string().contains("connection reset"));
    }
}
