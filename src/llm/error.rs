//! Error types for LLM provider calls

use thiserror::Error;

/// Result type for LLM provider operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors raised while building or calling an LLM provider
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM provider '{name}' not found. Available: {available:?}")]
    NotConfigured { name: String, available: Vec<String> },

    #[error("Unknown provider type '{provider_type}'. Known types: {known}")]
    UnknownProviderType { provider_type: String, known: String },

    #[error("Provider type '{provider_type}' needs the '{feature}' feature, which this build does not include")]
    MissingDependency { provider_type: String, feature: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("AI provider error: {0}")]
    ProviderError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error: {status_code} - {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Timeout error: operation took longer than {timeout_secs}s")]
    TimeoutError { timeout_secs: u64 },
}

impl LlmError {
    /// Check if the error is worth retrying by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::NetworkError(_) | LlmError::TimeoutError { .. }
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LlmError::ConfigurationError(msg) => {
                format!("Configuration issue: {}. Check daibai.toml or your .env file.", msg)
            }
            LlmError::NetworkError(msg) => {
                format!("Network error: {}. Check your internet connection.", msg)
            }
            LlmError::ApiError {
                status_code,
                message,
            } => format!("API error ({}): {}", status_code, message),
            LlmError::TimeoutError { timeout_secs } => {
                format!(
                    "Request timed out after {} seconds. Try again or raise llm.timeout_seconds.",
                    timeout_secs
                )
            }
            LlmError::MissingDependency { provider_type, feature } => format!(
                "Provider type '{}' is not available. Rebuild with `--features {}`.",
                provider_type, feature
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LlmError::NetworkError("reset".into()), true)]
    #[case(LlmError::TimeoutError { timeout_secs: 15 }, true)]
    #[case(LlmError::ApiError { status_code: 401, message: "bad key".into() }, false)]
    #[case(LlmError::ConfigurationError("no key".into()), false)]
    fn test_is_retryable(#[case] error: LlmError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
    }

    #[rstest]
    fn test_not_configured_lists_available() {
        let error = LlmError::NotConfigured {
            name: "nope".into(),
            available: vec!["gpt".into(), "claude".into()],
        };
        assert_eq!(
            error.to_string(),
            "LLM provider 'nope' not found. Available: [\"gpt\", \"claude\"]"
        );
    }
}
