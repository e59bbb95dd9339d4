//! Error types for the ReplyForge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use crate::provider::ProviderTrace;
use thiserror::Error;

/// The top-level error type for all ReplyForge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Routing errors ---
    #[error("Routing error: {0}")]
    Router(#[from] RouterError),

    // --- Template errors ---
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A failure reported by a single generation backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider returned an empty completion")]
    EmptyCompletion,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A failure of the ordered failover chain as a whole.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("No providers configured")]
    NoProvidersConfigured,

    #[error("All {} providers exhausted, last error: {last_error}", trace.len())]
    AllProvidersExhausted {
        last_error: ProviderError,
        trace: ProviderTrace,
    },
}

impl RouterError {
    /// The attempts made before giving up (empty when nothing was configured).
    pub fn trace(&self) -> ProviderTrace {
        match self {
            Self::NoProvidersConfigured => ProviderTrace::default(),
            Self::AllProvidersExhausted { trace, .. } => trace.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderAttempt;
    use std::time::Duration;

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
    fn exhausted_error_reports_attempt_count_and_last_error() {
        let trace = ProviderTrace::from(vec![
            ProviderAttempt::failed("a", Duration::from_millis(3), "boom"),
            ProviderAttempt::failed("b", Duration::from_millis(4), "conn refused"),
        ]);
        let err = RouterError::AllProvidersExhausted {
            last_error: ProviderError::Network("conn refused".into()),
            trace,
        };
        let text = err.to_string();
        assert!(text.contains("All 2 providers"));
        assert!(text.contains("conn refused"));
        assert_eq!(err.trace().len(), 2);
    }

    #[test]
    fn template_not_found_names_the_template() {
        let err = Error::from(TemplateError::NotFound("welcome".into()));
        assert!(err.to_string().contains("welcome"));
    }
}
