//! Error types surfaced by the agent

use crate::ai_sql::cache::CacheError;
use crate::database::DatabaseError;
use crate::llm::LlmError;
use thiserror::Error;

/// Result type for agent operations
pub type AiResult<T> = Result<T, AiError>;

/// Errors the agent hands back to its callers
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Database '{name}' not found. Available: {available:?}")]
    UnknownDatabase { name: String, available: Vec<String> },

    #[error("LLM provider '{name}' not found. Available: {available:?}")]
    UnknownProvider { name: String, available: Vec<String> },

    #[error("No database selected")]
    NoDatabaseSelected,

    #[error("No LLM provider selected")]
    NoProviderSelected,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Schema cache error: {0}")]
    Cache(#[from] CacheError),
}

impl AiError {
    /// Unknown database or provider name; state was left untouched
    pub fn is_selector_error(&self) -> bool {
        matches!(
            self,
            AiError::UnknownDatabase { .. } | AiError::UnknownProvider { .. }
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AiError::NoDatabaseSelected => {
                "No database selected. Add one under [databases] or use @use <name>.".to_string()
            }
            AiError::NoProviderSelected => {
                "No LLM provider selected. Add one under [llm.providers] or use @llm <name>."
                    .to_string()
            }
            AiError::Llm(e) => e.user_message(),
            _ => self.to_string(),
        }
    }
}
