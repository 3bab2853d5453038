//! Error types for the PlanSage core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the model, document store, and configuration domains.

use std::path::PathBuf;

/// Top-level error type for the PlanSage core library.
#[derive(Debug, thiserror::Error)]
pub enum PlanSageError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from chat model interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the document store and embedding clients.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store request failed: {message}")]
    Request { message: String },

    #[error("Store response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for store {store}")]
    AuthFailed { store: String },

    #[error("Embedding generation failed: {message}")]
    Embedding { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Invalid ingestion kind '{kind}'. Must be 'document' or 'text'")]
    UnknownIngestKind { kind: String },

    #[error("Prompt input variable '{variable}' is not referenced by any template")]
    UnreferencedVariable { variable: String },
}

/// A type alias for results using the top-level `PlanSageError`.
pub type Result<T> = std::result::Result<T, PlanSageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = PlanSageError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_store() {
        let err = PlanSageError::Store(StoreError::Embedding {
            message: "empty response".into(),
        });
        assert_eq!(
            err.to_string(),
            "Document store error: Embedding generation failed: empty response"
        );
    }

    #[test]
    fn test_error_display_ingest_kind() {
        let err = PlanSageError::Config(ConfigError::UnknownIngestKind {
            kind: "image".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid ingestion kind 'image'. Must be 'document' or 'text'"
        );
    }

    #[test]
    fn test_error_display_unreferenced_variable() {
        let err = ConfigError::UnreferencedVariable {
            variable: "context".into(),
        };
        assert_eq!(
            err.to_string(),
            "Prompt input variable 'context' is not referenced by any template"
        );
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = LlmError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlanSageError = io_err.into();
        assert!(matches!(err, PlanSageError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: PlanSageError = serde_err.into();
        assert!(matches!(err, PlanSageError::Serialization(_)));
    }
}
