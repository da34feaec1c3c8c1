//! Generation backends.
//!
//! The refinement engines only ever need "send a system and user message,
//! get text back, time out if slow". [`GenerationBackend`] is that seam;
//! [`OpenAiCompatibleBackend`] is the production implementation and tests
//! script their own.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::modes::errors::OrchestrationError;

/// One outbound generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Stage label, used for logging and by scripted test backends.
    pub stage: &'static str,
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send one request and return the reply body as plain text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OrchestrationError>;
}

/// OpenAI-compatible `/chat/completions` backend (OpenRouter, OpenAI, vLLM, ...).
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, OrchestrationError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OrchestrationError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
///
/// A null content is an empty reply, not an error.
fn completion_content(body: &Value) -> Option<String> {
    let message = body.get("choices")?.get(0)?.get("message")?;
    Some(message["content"].as_str().unwrap_or("").to_string())
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, OrchestrationError> {
        let request_body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "temperature": request.temperature
        });

        debug!(stage = request.stage, model = %request.model, "sending generation request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::Transport(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;
        let resp_json: Value = serde_json::from_str(&text)
            .map_err(|e| OrchestrationError::Transport(format!("response body is not JSON: {e}")))?;

        completion_content(&resp_json)
            .ok_or_else(|| OrchestrationError::malformed("completion has no choices", text))
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> OrchestrationError {
    if err.is_timeout() {
        OrchestrationError::Timeout(timeout)
    } else {
        OrchestrationError::Transport(err.to_string())
    }
}
