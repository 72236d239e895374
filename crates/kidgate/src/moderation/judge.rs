//! Shared request/parse pipeline for every model-judged stage.
//!
//! Each stage supplies a [`JudgeCall`]: its system framing, its user content
//! and whether the temperature is pinned. [`run`] sends exactly one request,
//! strips code fences and parses the reply as a JSON object. Field-level
//! interpretation stays with the stage.

use crate::api::ChatBackend;
use crate::api::json::parse_object;
use crate::{ChatRequest, GateResult, Message};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Which stage is calling the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Screening,
    Composition,
    Validation,
    Followup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Screening => "screening",
            Stage::Composition => "composition",
            Stage::Validation => "validation",
            Stage::Followup => "followup",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One judge or generator request.
#[derive(Debug, Clone)]
pub struct JudgeCall {
    pub stage: Stage,
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: Option<f32>,
}

impl JudgeCall {
    pub fn new(
        stage: Stage,
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            model: model.into(),
            system: system.into(),
            user: user.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn to_request(&self) -> ChatRequest {
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                Message::system(self.system.clone()),
                Message::user(self.user.clone()),
            ],
        );
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

/// A parsed judge reply.
#[derive(Debug, Clone)]
pub struct JudgeReply {
    /// Model the provider reports having used.
    pub model: String,
    pub fields: Map<String, Value>,
}

/// Send one request and parse the reply as a JSON object.
///
/// Transport failures and replies that are not a JSON object after fence
/// stripping surface as [`GateError::Upstream`](crate::GateError::Upstream).
pub async fn run(backend: &dyn ChatBackend, call: &JudgeCall) -> GateResult<JudgeReply> {
    let request = call.to_request();
    debug!(
        stage = %call.stage,
        model = %call.model,
        provider = backend.provider(),
        "Calling model"
    );

    let completion = backend.complete(&request).await.inspect_err(|e| {
        warn!(stage = %call.stage, error = %e, "Model call failed");
    })?;

    let fields = parse_object(&completion.content).inspect_err(|e| {
        warn!(stage = %call.stage, error = %e, "Model reply was not a JSON object");
    })?;

    debug!(
        stage = %call.stage,
        model = %completion.model,
        fields = fields.len(),
        "Model reply parsed"
    );
    Ok(JudgeReply {
        model: completion.model,
        fields,
    })
}

/// Log a degraded verdict. Never escalates.
pub(crate) fn report_degraded(stage: Stage, defaulted: &[String]) {
    if !defaulted.is_empty() {
        warn!(
            stage = %stage,
            fields = ?defaulted,
            "Judge reply incomplete; filled with safe defaults"
        );
    }
}
