//! Shared HTTP plumbing for vendor clients

use crate::llm::error::{LlmError, LlmResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub(crate) fn build_client(timeout_secs: u64) -> LlmResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::NetworkError(format!("Failed to create HTTP client: {}", e)))
}

fn map_transport_error(error: reqwest::Error, timeout_secs: u64) -> LlmError {
    if error.is_timeout() {
        LlmError::TimeoutError { timeout_secs }
    } else {
        LlmError::NetworkError(format!("Request failed: {}", error))
    }
}

/// Send `request`, fail on non-2xx with the body as message, decode JSON
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout_secs: u64,
) -> LlmResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(e, timeout_secs))?;

    let status = response.status();
    debug!("[http::send_json] Response status: {}", status);
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::ApiError {
            status_code: status.as_u16(),
            message: error_text,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout_secs))?;
    serde_json::from_str(&body)
        .map_err(|e| LlmError::ProviderError(format!("Failed to parse API response: {}", e)))
}
