//! OpenAI chat-completions wire format, shared by OpenAI-compatible vendors and Azure

use crate::llm::GenerationContext;
use crate::llm::error::{LlmError, LlmResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatReply,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatReply {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub total_tokens: Option<u64>,
}

/// System message (when there is system text) followed by the user prompt
pub(crate) fn build_messages(prompt: &str, context: &GenerationContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = context.system_text() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    });
    messages
}

impl ChatResponse {
    /// Text of the first choice plus total token usage
    pub fn into_text(self) -> LlmResult<(String, Option<u64>)> {
        let tokens = self.usage.and_then(|u| u.total_tokens);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ProviderError("No choices in response".to_string()))?;
        Ok((choice.message.content.unwrap_or_default(), tokens))
    }
}
