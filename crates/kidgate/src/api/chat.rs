//! Chat Completions client.

use super::{ApiErrorBody, ChatBackend, ChatFuture, http_client, post_json};
use crate::{ChatCompletion, ChatRequest, GateError, GateResult, OPENAI_BASE_URL, UsageInfo};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default request timeout for model calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    model: Option<String>,
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorBody>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Deserialize, Debug)]
struct RawMessage {
    content: Option<String>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Client for the public OpenAI endpoint with the default timeout.
    pub fn new(api_key: impl Into<String>) -> GateResult<Self> {
        Self::with_base_url(api_key, OPENAI_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Client for any OpenAI-compatible base URL (e.g. a proxy or local server).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> GateResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, body: &ChatRequest) -> GateResult<ChatCompletion> {
        debug!(
            "Model request: model={}, messages={}, temp={:?}",
            body.model,
            body.messages.len(),
            body.temperature,
        );

        let text = post_json(&self.client, &self.endpoint(), &self.api_key, body).await?;
        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| GateError::upstream(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(GateError::upstream(format!("API error: {}", err.message)));
        }

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!("Model output: {} chars", content.len());

        Ok(ChatCompletion {
            model: parsed.model.unwrap_or_else(|| body.model.clone()),
            content,
            usage: parsed.usage,
        })
    }
}

impl ChatBackend for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }

    fn provider(&self) -> &str {
        "chat"
    }
}
