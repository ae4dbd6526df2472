//! Anthropic Claude messages API

use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::http::{build_client, send_json};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider implementation
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(descriptor: &ProviderDescriptor, settings: ProviderSettings) -> LlmResult<Self> {
        let ProviderSettings::Anthropic { base_url } = settings else {
            return Err(LlmError::ConfigurationError(format!(
                "Provider '{}' is not configured for Anthropic",
                descriptor.name
            )));
        };

        Ok(Self {
            client: build_client(descriptor.timeout_seconds)?,
            api_key: descriptor.api_key_for(ProviderType::Anthropic)?,
            base_url,
            model: descriptor.model_for(ProviderType::Anthropic)?,
            temperature: descriptor.temperature,
            max_tokens: descriptor.max_tokens,
            timeout_secs: descriptor.timeout_seconds,
        })
    }

    pub fn create(
        descriptor: &ProviderDescriptor,
        settings: ProviderSettings,
    ) -> LlmResult<Arc<dyn LlmProvider>> {
        Ok(Arc::new(Self::new(descriptor, settings)?))
    }

    fn request_body(&self, prompt: &str, context: &GenerationContext) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: context.system_text(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
        info!("Generating with Anthropic model {}", self.model);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(
            "Calling Anthropic API with model: {}, max_tokens: {}, temperature: {}",
            self.model, self.max_tokens, self.temperature
        );

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt, context));

        let response_body: AnthropicResponse = send_json(request, self.timeout_secs).await?;
        let (text, tokens) = response_body.into_text()?;
        Ok(LlmResponse::from_text(text, &self.model, tokens))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicResponse {
    fn into_text(self) -> LlmResult<(String, Option<u64>)> {
        if self.content.is_empty() {
            return Err(LlmError::ProviderError("No content in response".to_string()));
        }
        let text = self
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        let tokens = self.usage.map(|u| u.input_tokens + u.output_tokens);
        Ok((text, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn provider() -> AnthropicProvider {
        let mut descriptor = ProviderDescriptor::new("claude", "anthropic", "");
        descriptor.api_key = Some("sk-ant-test".to_string());
        let settings = ProviderSettings::resolve(ProviderType::Anthropic, &descriptor).unwrap();
        AnthropicProvider::new(&descriptor, settings).unwrap()
    }

    #[rstest]
    fn test_default_model_and_base_url() {
        let provider = provider();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-20241022");
        assert_eq!(provider.base_url, "https://api.anthropic.com");
    }

    #[rstest]
    fn test_system_text_goes_to_system_field() {
        let context = GenerationContext::default()
            .with_system_prompt("You write SQL.")
            .with_schema("CREATE TABLE t (id int)");
        let body = serde_json::to_value(provider().request_body("count t", &context)).unwrap();
        assert_eq!(
            body["system"],
            "You write SQL.\n\nDatabase Schema:\nCREATE TABLE t (id int)"
        );
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[rstest]
    fn test_no_system_field_without_context() {
        let body = serde_json::to_value(provider().request_body("hi", &GenerationContext::default())).unwrap();
        assert!(body.get("system").is_none());
    }

    #[rstest]
    fn test_parse_response() {
        let body = r#"{"content":[{"type":"text","text":"```sql\nSELECT 1;\n```"}],"usage":{"input_tokens":10,"output_tokens":5}}"#;
        let response: AnthropicResponse = serde_json::from_str(body).unwrap();
        let (text, tokens) = response.into_text().unwrap();
        assert!(text.contains("SELECT 1;"));
        assert_eq!(tokens, Some(15));
    }
}
