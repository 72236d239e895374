//! REST API endpoint handlers.
//!
//! Each handler is a thin wrapper around one library operation. Stage
//! endpoints (`/api/screen`, `/api/compose`, `/api/validate`) make exactly one
//! model call; `/api/interact` runs the whole gate.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kidgate::api::ChatBackend;
use kidgate::audit::{
    AuditContext, AuditRecorder, AuditStore, JsonlAuditStore, MemoryAuditStore, RecentChecks,
};
use kidgate::config::GateConfig;
use kidgate::gate::{GateOutcome, Gatekeeper, Interaction};
use kidgate::moderation::strategy::{self, StrategyInfo};
use kidgate::moderation::{
    self, ComplianceVerdict, ComposeRequest, ModerationResult, ValidationRequest,
    ValidationVerdict,
};
use kidgate::profile::{MemoryProfiles, SyncReport, sync_system_prompt};
use kidgate::whitelist::features::{self, Feature};
use kidgate::whitelist::{FeatureWhitelist, build_system_prompt};
use kidgate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

const DEFAULT_AUDIT_LIMIT: usize = 20;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<Gatekeeper>,
    profiles: Arc<MemoryProfiles>,
    recorder: AuditRecorder,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<dyn AuditStore>, config: GateConfig) -> Self {
        let profiles = Arc::new(MemoryProfiles::new());
        let gate = Gatekeeper::new(backend, profiles.clone(), store.clone(), config);
        Self {
            gate: Arc::new(gate),
            profiles,
            recorder: AuditRecorder::new(store),
        }
    }

    /// Provider client and audit store as the config describes them.
    pub fn from_config(config: GateConfig, api_key: Option<&str>) -> GateResult<Self> {
        let backend = config.connect(api_key)?;
        let store: Arc<dyn AuditStore> = match &config.audit_dir {
            Some(dir) => Arc::new(JsonlAuditStore::open(dir)?),
            None => Arc::new(MemoryAuditStore::new()),
        };
        Ok(Self::new(backend, store, config))
    }

    pub fn profiles(&self) -> &Arc<MemoryProfiles> {
        &self.profiles
    }

    fn backend(&self) -> &dyn ChatBackend {
        self.gate.backend().as_ref()
    }

    fn config(&self) -> &GateConfig {
        self.gate.config()
    }

    fn audit<T>(&self, written: GateResult<T>) {
        if let Err(e) = written {
            warn!("Audit write failed: {e}");
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// A failed request rendered as an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// The body was well-formed JSON but cannot be served.
    BadRequest(String),
    Gate(GateError),
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self::Gate(e)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Gate(e) => match e {
                GateError::UnknownStrategy(_) => (StatusCode::BAD_REQUEST, "unknown_strategy"),
                GateError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream"),
                GateError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "configuration")
                }
                GateError::Audit(_) => (StatusCode::INTERNAL_SERVER_ERROR, "audit"),
                GateError::Profile(_) => (StatusCode::INTERNAL_SERVER_ERROR, "profile"),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Gate(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = self.message();
        warn!(%status, "Request failed: {message}");
        let body = json!({ "error": message, "kind": kind });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Catalogs ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FeaturesQuery {
    pub age: Option<u8>,
}

/// GET /api/features: Whitelistable features, filtered by `?age` if given.
pub async fn get_features(Query(query): Query<FeaturesQuery>) -> Json<Vec<&'static Feature>> {
    Json(match query.age {
        Some(age) => features::available_features(age),
        None => features::FEATURES.iter().collect(),
    })
}

/// GET /api/strategies: Moderation strategy names and instructions.
pub async fn get_strategies() -> Json<Vec<StrategyInfo>> {
    Json(strategy::catalog())
}

#[derive(Deserialize)]
pub struct PromptBody {
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Serialize)]
pub struct PromptReply {
    pub system_prompt: String,
}

/// POST /api/prompt: System prompt for a set of feature ids.
pub async fn post_prompt(Json(body): Json<PromptBody>) -> Json<PromptReply> {
    Json(PromptReply {
        system_prompt: build_system_prompt(&body.features),
    })
}

// ── Stages ─────────────────────────────────────────────────────────

/// Request body for POST /api/screen.
///
/// `system_prompt` wins over `features` when both are given.
#[derive(Deserialize)]
pub struct ScreenBody {
    pub child_prompt: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub system_prompt: Option<String>,
    pub judge_model: Option<String>,
    /// When present, the verdict is recorded in the audit trail.
    pub context: Option<AuditContext>,
}

/// POST /api/screen: Screen a child prompt against the whitelist.
pub async fn post_screen(
    State(app): State<AppState>,
    Json(body): Json<ScreenBody>,
) -> ApiResult<ComplianceVerdict> {
    let system_prompt = body
        .system_prompt
        .unwrap_or_else(|| build_system_prompt(&body.features));
    let config = app.config();
    let judge_model = body.judge_model.as_deref().unwrap_or(&config.judge_model);

    let verdict = moderation::screen_at(
        app.backend(),
        &body.child_prompt,
        &system_prompt,
        judge_model,
        config.judge_temperature,
    )
    .await?;

    if let Some(context) = &body.context {
        app.audit(app.recorder.record_screening(
            context,
            &body.child_prompt,
            &system_prompt,
            &verdict,
        ));
    }
    Ok(Json(verdict))
}

/// Request body for POST /api/compose.
///
/// `model` and `max_chars` fall back to the server's configuration.
#[derive(Deserialize)]
pub struct ComposeBody {
    #[serde(default)]
    pub child_prompt: String,
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub custom_instructions: Vec<String>,
    pub original_response: Option<String>,
    #[serde(default)]
    pub highlighted_texts: Vec<String>,
    pub model: Option<String>,
    pub max_chars: Option<usize>,
    pub child_age: Option<String>,
}

impl ComposeBody {
    fn into_request(self, config: &GateConfig) -> Result<ComposeRequest, ApiError> {
        if self.child_prompt.trim().is_empty() {
            return Err(ApiError::BadRequest("child_prompt must not be empty".into()));
        }
        Ok(ComposeRequest {
            child_prompt: self.child_prompt,
            strategies: self.strategies,
            custom_instructions: self.custom_instructions,
            original_response: self.original_response,
            highlighted_texts: self.highlighted_texts,
            model: self.model.unwrap_or_else(|| config.model.clone()),
            max_chars: self.max_chars.unwrap_or(config.max_chars),
            child_age: self.child_age,
        })
    }
}

/// POST /api/compose: Generate or refactor a reply under strategies.
pub async fn post_compose(
    State(app): State<AppState>,
    Json(body): Json<ComposeBody>,
) -> ApiResult<ModerationResult> {
    let request = body.into_request(app.config())?;
    Ok(Json(moderation::compose(app.backend(), &request).await?))
}

/// Request body for POST /api/validate.
///
/// `model` falls back to the configured judge model.
#[derive(Deserialize)]
pub struct ValidateBody {
    pub response_text: String,
    pub whitelist_system_prompt: String,
    pub original_child_prompt: Option<String>,
    pub model: Option<String>,
    /// When present, the verdict is recorded with `was_blocked = should_block`.
    pub context: Option<AuditContext>,
}

impl ValidateBody {
    fn to_request(&self, config: &GateConfig) -> ValidationRequest {
        let model = self.model.as_deref().unwrap_or(&config.judge_model);
        let request = ValidationRequest::new(&*self.response_text, &*self.whitelist_system_prompt)
            .with_model(model);
        match &self.original_child_prompt {
            Some(prompt) => request.with_child_prompt(prompt.as_str()),
            None => request,
        }
    }
}

/// POST /api/validate: Validate a finished reply.
pub async fn post_validate(
    State(app): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> ApiResult<ValidationVerdict> {
    let request = body.to_request(app.config());
    let verdict =
        moderation::validate_at(app.backend(), &request, app.config().judge_temperature).await?;
    if let Some(context) = &body.context {
        app.audit(app.recorder.record_validation(
            context,
            &request,
            &verdict,
            verdict.should_block,
        ));
    }
    Ok(Json(verdict))
}

#[derive(Deserialize)]
pub struct FollowupBody {
    pub initial_prompt: String,
    pub initial_response: String,
    pub model: Option<String>,
}

#[derive(Serialize)]
pub struct FollowupReply {
    pub child_followup_prompt: String,
}

/// POST /api/followup: Suggest the child's likely next question.
pub async fn post_followup(
    State(app): State<AppState>,
    Json(body): Json<FollowupBody>,
) -> ApiResult<FollowupReply> {
    let model = body.model.as_deref().unwrap_or(&app.config().model);
    let next = moderation::suggest_followup(
        app.backend(),
        &body.initial_prompt,
        &body.initial_response,
        model,
    )
    .await?;
    Ok(Json(FollowupReply {
        child_followup_prompt: next,
    }))
}

// ── Pipeline ───────────────────────────────────────────────────────

/// Request body for POST /api/interact.
#[derive(Deserialize)]
pub struct InteractBody {
    #[serde(flatten)]
    pub interaction: Interaction,
    /// Replaces the whitelist of the interaction's owner before running.
    pub features: Option<Vec<String>>,
}

/// POST /api/interact: Screen, compose and validate one child prompt.
pub async fn post_interact(
    State(app): State<AppState>,
    Json(body): Json<InteractBody>,
) -> ApiResult<GateOutcome> {
    if let Some(features) = body.features {
        app.profiles.set_whitelist(
            body.interaction.whitelist_owner(),
            FeatureWhitelist::new(features),
        );
    }
    Ok(Json(app.gate.run(&body.interaction).await?))
}

#[derive(Deserialize)]
pub struct WhitelistBody {
    pub features: Vec<String>,
    /// Accounts to write the rebuilt prompt to. Defaults to the child.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// PUT /api/children/{child_id}/whitelist: Store a whitelist and sync the prompt.
pub async fn put_whitelist(
    State(app): State<AppState>,
    Path(child_id): Path<String>,
    Json(body): Json<WhitelistBody>,
) -> ApiResult<SyncReport> {
    app.profiles
        .set_whitelist(child_id.as_str(), FeatureWhitelist::new(body.features));
    let targets = if body.targets.is_empty() {
        vec![child_id.clone()]
    } else {
        body.targets
    };
    Ok(Json(sync_system_prompt(
        app.profiles.as_ref(),
        &child_id,
        &targets,
    )?))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// GET /api/audit/{user_id}: Most recent checks of both kinds, newest first.
pub async fn get_audit(
    State(app): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<RecentChecks> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    Ok(Json(app.gate.audit_store().list_recent(&user_id, limit)?))
}
