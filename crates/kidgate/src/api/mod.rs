//! Model access layer: the backend seam, provider clients, and credentials.
//!
//! Every stage talks to the model through one narrow shape, messages in and
//! content out ([`ChatBackend`]). Provider-specific request and response
//! mapping stays inside the clients:
//!
//! - [`chat`]: Chat Completions (`POST {base}/chat/completions`).
//! - [`responses`]: Responses API (`POST {base}/responses`).
//! - [`scripted`]: canned replies for tests and offline runs.
//! - [`json`]: fence stripping and JSON object extraction for judge replies.
//! - [`retry`]: transient error classification and backoff for callers.

pub mod chat;
pub mod json;
pub mod responses;
pub mod retry;
pub mod scripted;

use crate::{ChatCompletion, ChatRequest, GateError, GateResult};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace};

pub use chat::OpenAiClient;
pub use responses::ResponsesClient;
pub use retry::RetryConfig;
pub use scripted::ScriptedBackend;

/// Boxed future returned by [`ChatBackend::complete`].
pub type ChatFuture<'a> = BoxFuture<'a, GateResult<ChatCompletion>>;

/// A model endpoint that turns a list of messages into reply text.
///
/// Calls are independent and stateless from the model's point of view;
/// implementors must not retry internally.
pub trait ChatBackend: Send + Sync {
    /// Send one request and return the reply.
    ///
    /// Uses a boxed future so that the trait stays dyn-compatible.
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;

    /// Short provider label for logs.
    fn provider(&self) -> &str {
        "custom"
    }
}

/// Which provider API shape a client speaks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// Chat Completions (`messages` → `choices[0].message.content`).
    #[default]
    Chat,
    /// Responses API (`instructions` + `input` → `output_text`).
    Responses,
}

impl FromStr for ApiStyle {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "chat_completions" | "chat-completions" => Ok(ApiStyle::Chat),
            "responses" => Ok(ApiStyle::Responses),
            other => Err(GateError::Configuration(format!(
                "unknown api style '{other}' (expected 'chat' or 'responses')"
            ))),
        }
    }
}

impl std::fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiStyle::Chat => write!(f, "chat"),
            ApiStyle::Responses => write!(f, "responses"),
        }
    }
}

// ── Credentials ────────────────────────────────────────────────────

/// Resolve the API key: an explicit, non-blank argument wins, otherwise the
/// named environment variable. Absence of both is a configuration error.
pub fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> GateResult<String> {
    resolve_api_key_with(explicit, env_var, |name| std::env::var(name).ok())
}

/// [`resolve_api_key`] with an injectable environment lookup.
pub fn resolve_api_key_with(
    explicit: Option<&str>,
    env_var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> GateResult<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    lookup(env_var)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            GateError::Configuration(format!(
                "API key is required: pass one explicitly or set {env_var}"
            ))
        })
}

// ── Shared HTTP plumbing ───────────────────────────────────────────

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorBody {
    pub(crate) message: String,
}

/// POST a JSON body with bearer auth and return the response text.
///
/// Non-2xx statuses become [`GateError::Upstream`] with the status attached.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> GateResult<String> {
    trace!(
        "Request payload size: {} bytes",
        serde_json::to_string(body).map_or(0, |s| s.len())
    );

    let start = Instant::now();
    let resp = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| GateError::transport(format!("request failed: {e}")))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| GateError::transport(format!("failed to read response: {e}")))?;

    debug!(
        "Model response: HTTP {} in {:.1}s ({} bytes)",
        status,
        start.elapsed().as_secs_f64(),
        text.len()
    );

    if !status.is_success() {
        return Err(GateError::http(status.as_u16(), text));
    }
    Ok(text)
}

/// Build the shared reqwest client used by both provider adapters.
pub(crate) fn http_client(timeout: std::time::Duration) -> GateResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("kidgate/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| GateError::Configuration(format!("failed to build HTTP client: {e}")))
}
