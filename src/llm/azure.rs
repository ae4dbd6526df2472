//! Azure OpenAI deployments

use crate::llm::chat::{ChatRequest, ChatResponse, build_messages};
use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::http::{build_client, send_json};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AzureProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl AzureProvider {
    pub fn new(descriptor: &ProviderDescriptor, settings: ProviderSettings) -> LlmResult<Self> {
        let ProviderSettings::Azure {
            endpoint,
            deployment,
            api_version,
        } = settings
        else {
            return Err(LlmError::ConfigurationError(format!(
                "Provider '{}' is not configured as an Azure deployment",
                descriptor.name
            )));
        };

        Ok(Self {
            client: build_client(descriptor.timeout_seconds)?,
            api_key: descriptor.api_key_for(ProviderType::Azure)?,
            endpoint,
            deployment,
            api_version,
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
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureProvider {
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
        info!("Generating with Azure deployment {}", self.deployment);
        debug!("[AzureProvider::generate] POST {}", self.url());

        let body = ChatRequest {
            model: None,
            messages: build_messages(prompt, context),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let request = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body);

        let response: ChatResponse = send_json(request, self.timeout_secs).await?;
        let (text, tokens) = response.into_text()?;
        Ok(LlmResponse::from_text(text, &self.deployment, tokens))
    }

    fn model_name(&self) -> &str {
        &self.deployment
    }

    fn provider_name(&self) -> &str {
        "azure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_deployment_url() {
        let mut descriptor = ProviderDescriptor::new("az", "azure", "gpt-4o");
        descriptor.api_key = Some("key".to_string());
        descriptor.endpoint = Some("https://acme.openai.azure.com".to_string());
        let settings = ProviderSettings::resolve(ProviderType::Azure, &descriptor).unwrap();
        let provider = AzureProvider::new(&descriptor, settings).unwrap();
        assert_eq!(
            provider.url(),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[rstest]
    fn test_wrong_settings_shape_rejected() {
        let descriptor = ProviderDescriptor::new("az", "azure", "gpt-4o");
        let settings = ProviderSettings::Ollama {
            host: "http://localhost:11434".to_string(),
        };
        assert!(AzureProvider::new(&descriptor, settings).is_err());
    }
}
