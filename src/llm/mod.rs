//! LLM vendor clients behind one `LlmProvider` trait

pub mod config;
pub mod error;
mod http;
pub mod pool;
pub mod registry;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "azure")]
pub mod azure;
#[cfg(any(feature = "openai", feature = "azure"))]
mod chat;
#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use config::{ProviderDescriptor, ProviderSettings, ProviderType};
pub use error::{LlmError, LlmResult};
pub use pool::ProviderPool;
pub use registry::{ProviderConstructor, ProviderRegistry};

use crate::ai_sql::extract::extract_fenced_sql;
use async_trait::async_trait;
use serde::Serialize;

/// Extra material sent alongside the user prompt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationContext {
    pub system_prompt: Option<String>,
    pub schema: Option<String>,
}

impl GenerationContext {
    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.system_prompt = Some(system_prompt.to_string());
        self
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// System prompt and schema joined by a blank line, `None` when both are absent
    pub fn system_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(system_prompt) = self.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            parts.push(system_prompt.to_string());
        }
        if let Some(schema) = self.schema.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("Database Schema:\n{schema}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// A model reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmResponse {
    pub text: String,
    /// SQL found in a fenced block of `text`, if any
    pub sql: Option<String>,
    pub tokens_used: Option<u64>,
    pub model: String,
}

impl LlmResponse {
    pub fn from_text(text: String, model: &str, tokens_used: Option<u64>) -> Self {
        let sql = extract_fenced_sql(&text);
        Self {
            text,
            sql,
            tokens_used,
            model: model.to_string(),
        }
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one prompt and wait for the whole reply
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse>;

    fn model_name(&self) -> &str;

    /// Vendor tag, e.g. `openai` or `groq`
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Provider replying with canned text and remembering what it was asked
    pub struct CannedProvider {
        pub reply: String,
        pub sql: Option<String>,
        pub prompts: Mutex<Vec<(String, GenerationContext)>>,
    }

    impl CannedProvider {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                sql: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> Option<(String, GenerationContext)> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), context.clone()));
            Ok(LlmResponse {
                text: self.reply.clone(),
                sql: self.sql.clone(),
                tokens_used: Some(42),
                model: "canned-1".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "canned-1"
        }

        fn provider_name(&self) -> &str {
            "canned"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(GenerationContext::default(), None)]
    #[case(GenerationContext::default().with_system_prompt("Be terse."), Some("Be terse."))]
    #[case(GenerationContext::default().with_schema("CREATE TABLE t (id int)"), Some("Database Schema:\nCREATE TABLE t (id int)"))]
    #[case(
        GenerationContext::default().with_system_prompt("Be terse.").with_schema("CREATE TABLE t (id int)"),
        Some("Be terse.\n\nDatabase Schema:\nCREATE TABLE t (id int)")
    )]
    fn test_system_text(#[case] context: GenerationContext, #[case] expected: Option<&str>) {
        assert_eq!(context.system_text().as_deref(), expected);
    }

    #[rstest]
    fn test_response_extracts_fenced_sql_only() {
        let fenced = LlmResponse::from_text("```sql\nSELECT 1;\n```".to_string(), "m", None);
        assert_eq!(fenced.sql.as_deref(), Some("SELECT 1;"));

        let bare = LlmResponse::from_text("SELECT 1".to_string(), "m", Some(7));
        assert_eq!(bare.sql, None);
        assert_eq!(bare.tokens_used, Some(7));
    }
}
