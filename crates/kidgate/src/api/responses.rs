//! Responses API client.
//!
//! Maps the provider-neutral [`ChatRequest`] onto the Responses API shape:
//! system messages become `instructions`, user messages become `input`.
//! Reply text comes from `output_text` when the provider includes it, else
//! from the first text item of `output[0].content`.

use super::chat::DEFAULT_TIMEOUT;
use super::{ApiErrorBody, ChatBackend, ChatFuture, http_client, post_json};
use crate::{
    ChatCompletion, ChatRequest, GateError, GateResult, MessageRole, OPENAI_BASE_URL, UsageInfo,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize, Debug)]
struct ResponsesBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> ResponsesBody<'a> {
    fn from_request(request: &'a ChatRequest) -> Self {
        let instructions = request.joined(MessageRole::System);
        Self {
            model: &request.model,
            instructions: (!instructions.is_empty()).then_some(instructions),
            input: request.joined(MessageRole::User),
            temperature: request.temperature,
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawResponsesResponse {
    model: Option<String>,
    output_text: Option<String>,
    output: Option<Vec<RawOutputItem>>,
    error: Option<ApiErrorBody>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawOutputItem {
    content: Option<Vec<RawContentItem>>,
}

#[derive(Deserialize, Debug)]
struct RawContentItem {
    text: Option<String>,
}

impl RawResponsesResponse {
    fn text(&self) -> Option<String> {
        if let Some(text) = self.output_text.as_deref().filter(|t| !t.is_empty()) {
            return Some(text.to_string());
        }
        self.output
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .iter()
            .find_map(|c| c.text.clone().filter(|t| !t.is_empty()))
    }
}

/// Async HTTP client for an OpenAI-compatible Responses endpoint.
pub struct ResponsesClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResponsesClient {
    pub fn new(api_key: impl Into<String>) -> GateResult<Self> {
        Self::with_base_url(api_key, OPENAI_BASE_URL, DEFAULT_TIMEOUT)
    }

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

    async fn send(&self, request: &ChatRequest) -> GateResult<ChatCompletion> {
        let body = ResponsesBody::from_request(request);
        debug!(
            "Model request (responses): model={}, input={} chars",
            body.model,
            body.input.len()
        );

        let url = format!("{}/responses", self.base_url);
        let text = post_json(&self.client, &url, &self.api_key, &body).await?;
        let parsed: RawResponsesResponse = serde_json::from_str(&text)
            .map_err(|e| GateError::upstream(format!("failed to parse response: {e}")))?;

        if let Some(ref err) = parsed.error {
            return Err(GateError::upstream(format!("API error: {}", err.message)));
        }

        let content = parsed
            .text()
            .ok_or_else(|| GateError::upstream("response contained no text output"))?;

        Ok(ChatCompletion {
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            content,
            usage: parsed.usage,
        })
    }
}

impl ChatBackend for ResponsesClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }

    fn provider(&self) -> &str {
        "responses"
    }
}
