//! Google Gemini generateContent API

use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::http::{build_client, send_json};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl GeminiProvider {
    pub fn new(descriptor: &ProviderDescriptor, settings: ProviderSettings) -> LlmResult<Self> {
        let ProviderSettings::Gemini { base_url } = settings else {
            return Err(LlmError::ConfigurationError(format!(
                "Provider '{}' is not configured for Gemini",
                descriptor.name
            )));
        };

        Ok(Self {
            client: build_client(descriptor.timeout_seconds)?,
            api_key: descriptor.api_key_for(ProviderType::Gemini)?,
            base_url,
            model: descriptor.model_for(ProviderType::Gemini)?,
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

    pub fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn request_body(&self, prompt: &str, context: &GenerationContext) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: context.system_text().map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
        info!("Generating with Gemini model {}", self.model);
        debug!("[GeminiProvider::generate] POST {}", self.url());

        let request = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt, context));

        let response: GeminiResponse = send_json(request, self.timeout_secs).await?;
        let (text, tokens) = response.into_text()?;
        Ok(LlmResponse::from_text(text, &self.model, tokens))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl GeminiResponse {
    fn into_text(self) -> LlmResult<(String, Option<u64>)> {
        let tokens = self.usage_metadata.and_then(|u| u.total_token_count);
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| LlmError::ProviderError("No candidates in response".to_string()))?;
        let text = content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        Ok((text, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn provider() -> GeminiProvider {
        let mut descriptor = ProviderDescriptor::new("gem", "gemini", "");
        descriptor.api_key = Some("g-key".to_string());
        descriptor.temperature = 0.1;
        let settings = ProviderSettings::resolve(ProviderType::Gemini, &descriptor).unwrap();
        GeminiProvider::new(&descriptor, settings).unwrap()
    }

    #[rstest]
    fn test_url_uses_default_model() {
        assert_eq!(
            provider().url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[rstest]
    fn test_request_body_shape() {
        let context = GenerationContext::default().with_system_prompt("You write SQL.");
        let body = serde_json::to_value(provider().request_body("count users", &context)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "count users");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You write SQL.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[rstest]
    fn test_parse_response_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"SELECT "},{"text":"1"}]}}],"usageMetadata":{"totalTokenCount":9}}"#;
        let response: GeminiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_text().unwrap(), ("SELECT 1".to_string(), Some(9)));
    }

    #[rstest]
    fn test_blocked_response_is_an_error() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(response.into_text().is_err());
    }
}
