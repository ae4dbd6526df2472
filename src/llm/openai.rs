//! OpenAI and the OpenAI-compatible vendor family (Groq, DeepSeek, Mistral,
//! Nvidia, Alibaba DashScope, Meta-hosted endpoints)

use crate::llm::chat::{ChatRequest, ChatResponse, build_messages};
use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::http::{build_client, send_json};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};

pub struct OpenAiProvider {
    client: Client,
    kind: ProviderType,
    api_key: String,
    base_url: String,
    organization: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(
        kind: ProviderType,
        descriptor: &ProviderDescriptor,
        settings: ProviderSettings,
    ) -> LlmResult<Self> {
        let ProviderSettings::OpenAiCompatible {
            base_url,
            organization,
        } = settings
        else {
            return Err(LlmError::ConfigurationError(format!(
                "Provider '{}' is not configured as an OpenAI-compatible endpoint",
                descriptor.name
            )));
        };

        Ok(Self {
            client: build_client(descriptor.timeout_seconds)?,
            kind,
            api_key: descriptor.api_key_for(kind)?,
            base_url,
            organization,
            model: descriptor.model_for(kind)?,
            temperature: descriptor.temperature,
            max_tokens: descriptor.max_tokens,
            timeout_secs: descriptor.timeout_seconds,
        })
    }

    /// Registry entry point
    pub fn create(
        descriptor: &ProviderDescriptor,
        settings: ProviderSettings,
    ) -> LlmResult<Arc<dyn LlmProvider>> {
        let kind = descriptor.resolve_type()?;
        Ok(Arc::new(Self::new(kind, descriptor, settings)?))
    }

    fn request_body(&self, prompt: &str, context: &GenerationContext) -> ChatRequest {
        ChatRequest {
            model: Some(self.model.clone()),
            messages: build_messages(prompt, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
        info!("Generating with {} model {}", self.kind, self.model);
        debug!(
            "[OpenAiProvider::generate] POST {} (max_tokens: {}, temperature: {})",
            self.endpoint(),
            self.max_tokens,
            self.temperature
        );

        let mut request = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, context));
        if let Some(organization) = &self.organization {
            request = request.header("OpenAI-Organization", organization);
        }

        let response: ChatResponse = send_json(request, self.timeout_secs).await?;
        let (text, tokens) = response.into_text()?;
        Ok(LlmResponse::from_text(text, &self.model, tokens))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        let name: &'static str = self.kind.into();
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn provider(tag: &str) -> OpenAiProvider {
        let mut descriptor = ProviderDescriptor::new("p", tag, "some-model");
        descriptor.api_key = Some("sk-test".to_string());
        let kind = descriptor.resolve_type().unwrap();
        let settings = ProviderSettings::resolve(kind, &descriptor).unwrap();
        OpenAiProvider::new(kind, &descriptor, settings).unwrap()
    }

    #[rstest]
    #[case("openai", "https://api.openai.com/v1/chat/completions")]
    #[case("mistral", "https://api.mistral.ai/v1/chat/completions")]
    #[case("alibaba", "https://dashscope-intl.aliyuncs.com/compatible-mode/v1/chat/completions")]
    fn test_endpoint_per_vendor(#[case] tag: &str, #[case] expected: &str) {
        let provider = provider(tag);
        assert_eq!(provider.endpoint(), expected);
        assert_eq!(provider.provider_name(), tag);
    }

    #[rstest]
    fn test_request_body_shape() {
        let provider = provider("groq");
        let context = GenerationContext::default().with_system_prompt("You write SQL.");
        let body = serde_json::to_value(provider.request_body("count users", &context)).unwrap();
        assert_eq!(body["model"], "some-model");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "count users");
    }

    #[rstest]
    fn test_missing_api_key_is_a_configuration_error() {
        let descriptor = ProviderDescriptor::new("p", "nvidia", "meta/llama-3.1-70b");
        let settings = ProviderSettings::resolve(ProviderType::Nvidia, &descriptor).unwrap();
        if std::env::var("NVIDIA_API_KEY").is_err() {
            let result = OpenAiProvider::new(ProviderType::Nvidia, &descriptor, settings);
            assert!(matches!(result, Err(LlmError::ConfigurationError(_))));
        }
    }
}
