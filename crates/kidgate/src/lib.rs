//! Parent-configured moderation gate for a child's conversations with an LLM.
//!
//! `kidgate` puts two model-judged checkpoints around every reply a child
//! receives. A parent picks a whitelist of features for the child; the
//! whitelist becomes a system prompt; the child's prompt is screened against
//! that system prompt before anything is generated; a reply is composed under
//! parent-selected moderation strategies; and the finished reply is validated
//! against the whitelist again before it may be delivered.
//!
//! # Getting started
//!
//! ```ignore
//! use kidgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> GateResult<()> {
//!     let config = GateConfig::default();
//!     let backend = config.connect(None)?;
//!
//!     let system_prompt = build_system_prompt(&["school_assignment"]);
//!     let verdict = screen(
//!         backend.as_ref(),
//!         "Can you help me understand fractions?",
//!         &system_prompt,
//!         &config.judge_model,
//!     )
//!     .await?;
//!
//!     if verdict.is_compliant {
//!         let request = ComposeRequest::new("Can you help me understand fractions?")
//!             .with_strategies(["Tailor to Age Group", "Encourage Introspection"])
//!             .with_child_age("9-12 years");
//!         let result = compose(backend.as_ref(), &request).await?;
//!         println!("{}", result.refactored_response);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Whitelist prompts:** [`whitelist::build_system_prompt`] turns feature
//!   ids into the child's system prompt. Feature metadata and age groups live
//!   in [`whitelist::features`] and [`whitelist::age`].
//!
//! - **The three model-judged stages:** [`moderation::screener`] (before
//!   generation), [`moderation::composer`] (generation or refactoring under
//!   [`moderation::strategy`] instructions) and [`moderation::validator`]
//!   (after generation). All three share the request/parse pipeline in
//!   [`moderation::judge`].
//!
//! - **Talking to the model:** implement [`ChatBackend`](api::ChatBackend) or
//!   use the bundled [`OpenAiClient`](api::chat::OpenAiClient) (Chat
//!   Completions) and [`ResponsesClient`](api::responses::ResponsesClient)
//!   (Responses API). [`ScriptedBackend`](api::scripted::ScriptedBackend)
//!   replays canned replies for tests.
//!
//! - **Audit trail:** [`audit`] holds the append-only verdict records and the
//!   in-memory and JSON Lines stores.
//!
//! - **Running a whole interaction:** [`gate::Gatekeeper`] sequences
//!   screen → compose → validate → deliver-or-block and reports every step
//!   through [`gate::events::EventHandler`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`whitelist`] | System prompt builder, feature catalog, age groups |
//! | [`moderation`] | Strategy catalog, screener, composer, validator, follow-up suggestions |
//! | [`api`] | [`ChatBackend`](api::ChatBackend) seam, provider clients, credential resolution, retry helpers |
//! | [`audit`] | Verdict records, [`AuditStore`](audit::AuditStore), recorder |
//! | [`profile`] | Profile/settings collaborator seam and prompt sync |
//! | [`gate`] | Caller-side orchestration and stage events |
//! | [`config`] | [`GateConfig`](config::GateConfig) |
//!
//! # Failure semantics
//!
//! Field-level noise from the model is absorbed locally: missing or malformed
//! verdict fields are filled with fixed defaults and reported as a degraded
//! verdict. Only a failed call or a reply that is not JSON at all surfaces as
//! [`GateError::Upstream`]. None of the stages retry; the caller owns that.

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod moderation;
pub mod prelude;
pub mod profile;
pub mod prompt;
pub mod whitelist;

use serde::{Deserialize, Serialize};

pub use error::{GateError, GateResult};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL of the OpenAI-compatible API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for generation and judging.
pub const DEFAULT_MODEL: &str = "gpt-5.2-chat-latest";

/// Environment variable consulted when no API key is passed explicitly.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Sampling temperature for the screening and validation judges.
pub const JUDGE_TEMPERATURE: f32 = 0.3;

/// Default advisory character budget for composed replies.
pub const DEFAULT_MAX_CHARS: usize = 600;

/// Reply shown to the child whenever a stage refuses, blocks, or has nothing
/// usable to say.
pub const DEFERRAL_REPLY: &str =
    "Let's talk with a trusted adult about this. I can help with safer questions.";

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in a judge or generator request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Request / response ─────────────────────────────────────────────

/// Provider-neutral request shape: a model, the messages, and an optional
/// temperature. Provider clients map this onto their own wire format.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Concatenated content of every message with the given role.
    pub fn joined(&self, role: MessageRole) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What a backend hands back: the model that actually answered and the raw
/// text content of its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    /// Model name reported by the provider (falls back to the requested one).
    pub model: String,
    /// Raw reply text. Empty when the provider returned no content.
    pub content: String,
    pub usage: Option<UsageInfo>,
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    #[serde(alias = "input_tokens")]
    pub prompt_tokens: Option<u32>,
    #[serde(alias = "output_tokens")]
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Convenience ────────────────────────────────────────────────────

/// Screen a child prompt with a one-off client built from default settings.
///
/// `api_key` takes precedence over the `OPENAI_API_KEY` environment variable;
/// a missing key is a [`GateError::Configuration`] raised before any request.
pub async fn screen_prompt(
    child_prompt: &str,
    system_prompt: &str,
    judge_model: &str,
    api_key: Option<&str>,
) -> GateResult<moderation::ComplianceVerdict> {
    let backend = config::GateConfig::default().connect(api_key)?;
    moderation::screen(backend.as_ref(), child_prompt, system_prompt, judge_model).await
}

/// Compose a reply with a one-off client built from default settings.
///
/// Strategy names are checked before the credential is resolved, so an
/// unknown strategy never reaches the network.
pub async fn compose_reply(
    request: &moderation::ComposeRequest,
    api_key: Option<&str>,
) -> GateResult<moderation::ModerationResult> {
    moderation::strategy::resolve(&request.strategies)?;
    let backend = config::GateConfig::default().connect(api_key)?;
    moderation::compose(backend.as_ref(), request).await
}

/// Validate a finished reply with a one-off client built from default settings.
pub async fn validate_reply(
    request: &moderation::ValidationRequest,
    api_key: Option<&str>,
) -> GateResult<moderation::ValidationVerdict> {
    let backend = config::GateConfig::default().connect(api_key)?;
    moderation::validate(backend.as_ref(), request).await
}
