//! OpenAI-compatible chat completions client
//!
//! Speaks the `/chat/completions` wire format over reqwest, which covers
//! OpenAI itself and the self-hosted servers that mimic it.

use crate::http::{classify_status, endpoint, retry_after_ms, transport_error};
use async_trait::async_trait;
use delve_core::{
    ChatMessage, ChatProvider, ChatRequest, DelveError, DelveResult, ErrorContext, LlmConfig,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    provider: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Create a new client from the `[llm]` configuration section
    pub fn new(config: &LlmConfig) -> DelveResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DelveError::Config {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("llm_client").with_operation("build_client"),
            })?;

        info!(
            provider = %config.provider,
            model = %config.model,
            base_url = %config.base_url,
            "Created LLM client"
        );

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            provider: config.provider.clone(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleClient {
    async fn generate(&self, request: &ChatRequest) -> DelveResult<String> {
        let start_time = Instant::now();
        let body = CompletionRequest {
            model: &request.model.model,
            messages: &request.messages,
            temperature: request.model.temperature,
            max_tokens: request.model.max_tokens,
            response_format: request
                .model
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(
            provider = %self.provider,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let mut builder = self
            .http
            .post(endpoint(&self.base_url, "chat/completions"))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&self.provider, "chat_completion", self.timeout_ms, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(
                &self.provider,
                "chat_completion",
                status,
                retry_after,
                &text,
            ));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| transport_error(&self.provider, "chat_completion", self.timeout_ms, e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| DelveError::Upstream {
                message: "No text content in completion response".to_string(),
                status: Some(status.as_u16()),
                provider: Some(self.provider.clone()),
                context: ErrorContext::new(&self.provider).with_operation("chat_completion"),
            })?;

        debug!(
            provider = %self.provider,
            chars = content.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Received chat completion"
        );

        Ok(content)
    }

    fn name(&self) -> &str {
        &self.provider
    }
}
