//! Local models served by Ollama

use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::http::{build_client, send_json};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn new(descriptor: &ProviderDescriptor, settings: ProviderSettings) -> LlmResult<Self> {
        let ProviderSettings::Ollama { host } = settings else {
            return Err(LlmError::ConfigurationError(format!(
                "Provider '{}' is not configured for Ollama",
                descriptor.name
            )));
        };

        Ok(Self {
            client: build_client(descriptor.timeout_seconds)?,
            host,
            model: descriptor.model_for(ProviderType::Ollama)?,
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

    fn request_body(&self, prompt: &str, context: &GenerationContext) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: context.system_text(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, prompt: &str, context: &GenerationContext) -> LlmResult<LlmResponse> {
        info!("Generating with Ollama model {}", self.model);
        let url = format!("{}/api/generate", self.host);
        debug!("[OllamaProvider::generate] POST {}", url);

        let request = self.client.post(&url).json(&self.request_body(prompt, context));
        let response: OllamaResponse = send_json(request, self.timeout_secs).await?;

        let tokens = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt_tokens, output_tokens) => {
                Some(prompt_tokens.unwrap_or(0) + output_tokens.unwrap_or(0))
            }
        };
        Ok(LlmResponse::from_text(response.response, &self.model, tokens))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}
