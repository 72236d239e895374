//! Caller-side orchestration of one interaction.
//!
//! [`Gatekeeper::run`] sequences the stages:
//!
//! 1. rebuild the child's system prompt from the profile's whitelist,
//! 2. screen the child prompt and record the verdict; stop with
//!    [`GateOutcome::Refused`] if it is not compliant,
//! 3. compose a reply (generation, or refactoring a supplied prior reply),
//! 4. validate the reply, decide whether to block it through the
//!    [`BlockPolicy`] and any handler override, and record both the
//!    recommendation and the decision.
//!
//! The stages themselves never retry. The gatekeeper retries transient
//! upstream errors only when [`GateConfig::retries`] is non-zero.

pub mod events;

pub use events::{
    CompositeEventHandler, EventHandler, EventResponse, FnEventHandler, GateEvent,
    LoggingHandler, NoopHandler,
};

use crate::api::ChatBackend;
use crate::audit::{
    AuditContext, AuditRecorder, AuditStore, JsonlAuditStore, MemoryAuditStore,
};
use crate::config::GateConfig;
use crate::moderation::{
    self, ComplianceVerdict, ComposeRequest, ModerationResult, ValidationRequest,
    ValidationVerdict, strategy,
};
use crate::profile::ProfileDirectory;
use crate::whitelist::age::describe_age;
use crate::{DEFERRAL_REPLY, GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

// ── Block policy ───────────────────────────────────────────────────

/// How the validator's recommendation becomes a decision.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockPolicy {
    /// Block exactly when the validator says `should_block`.
    #[default]
    FollowRecommendation,
    /// Never block; verdicts are only recorded.
    AuditOnly,
    /// Block on any non-compliance or reported violation.
    BlockAnyViolation,
}

impl BlockPolicy {
    pub fn decide(&self, verdict: &ValidationVerdict) -> bool {
        match self {
            BlockPolicy::FollowRecommendation => verdict.should_block,
            BlockPolicy::AuditOnly => false,
            BlockPolicy::BlockAnyViolation => {
                verdict.should_block || !verdict.is_compliant || !verdict.violations.is_empty()
            }
        }
    }
}

impl FromStr for BlockPolicy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "follow_recommendation" | "follow" => Ok(BlockPolicy::FollowRecommendation),
            "audit_only" | "audit" => Ok(BlockPolicy::AuditOnly),
            "block_any_violation" | "strict" => Ok(BlockPolicy::BlockAnyViolation),
            other => Err(GateError::Configuration(format!(
                "unknown block policy '{other}'"
            ))),
        }
    }
}

// ── Interaction & outcome ──────────────────────────────────────────

/// One child prompt plus the parent's moderation choices for it.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Interaction {
    #[serde(flatten)]
    pub context: AuditContext,
    pub child_prompt: String,
    /// Age description for age tailoring, e.g. `"9-12 years"`.
    pub child_age: Option<String>,
    pub strategies: Vec<String>,
    pub custom_instructions: Vec<String>,
    /// Prior reply to refactor instead of generating one.
    pub original_response: Option<String>,
    pub highlighted_texts: Vec<String>,
}

impl Interaction {
    pub fn new(context: AuditContext, child_prompt: impl Into<String>) -> Self {
        Self {
            context,
            child_prompt: child_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_strategies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_custom_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.custom_instructions.push(instruction.into());
        self
    }

    pub fn with_child_age(mut self, age: impl Into<String>) -> Self {
        self.child_age = Some(age.into());
        self
    }

    /// Age as stored on a profile; rendered as its group label.
    pub fn with_child_age_years(self, age: u8) -> Self {
        self.with_child_age(describe_age(age))
    }

    pub fn refactoring(mut self, original_response: impl Into<String>) -> Self {
        self.original_response = Some(original_response.into());
        self
    }

    pub fn with_highlights<I, S>(mut self, highlights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.highlighted_texts = highlights.into_iter().map(Into::into).collect();
        self
    }

    /// Profile whose whitelist applies: the child if given, else the user.
    pub fn whitelist_owner(&self) -> &str {
        self.context
            .child_id
            .as_deref()
            .unwrap_or(&self.context.user_id)
    }

    fn compose_request(&self, config: &GateConfig) -> ComposeRequest {
        ComposeRequest {
            child_prompt: self.child_prompt.clone(),
            strategies: self.strategies.clone(),
            custom_instructions: self.custom_instructions.clone(),
            original_response: self.original_response.clone(),
            highlighted_texts: self.highlighted_texts.clone(),
            model: config.model.clone(),
            max_chars: config.max_chars,
            child_age: self.child_age.clone(),
        }
    }
}

/// What happened to one interaction.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    /// Screening failed; nothing was generated.
    Refused {
        screening: ComplianceVerdict,
        message: String,
    },
    Delivered {
        screening: ComplianceVerdict,
        result: ModerationResult,
        validation: ValidationVerdict,
    },
    /// A reply was composed but withheld.
    Blocked {
        screening: ComplianceVerdict,
        result: ModerationResult,
        validation: ValidationVerdict,
        message: String,
        /// The decision differs from the validator's recommendation.
        overridden: bool,
    },
}

impl GateOutcome {
    /// Text the child actually sees.
    pub fn reply_text(&self) -> &str {
        match self {
            GateOutcome::Refused { message, .. } | GateOutcome::Blocked { message, .. } => {
                message
            }
            GateOutcome::Delivered { result, .. } => &result.refactored_response,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, GateOutcome::Delivered { .. })
    }

    pub fn screening(&self) -> &ComplianceVerdict {
        match self {
            GateOutcome::Refused { screening, .. }
            | GateOutcome::Delivered { screening, .. }
            | GateOutcome::Blocked { screening, .. } => screening,
        }
    }
}

// ── Gatekeeper ─────────────────────────────────────────────────────

pub struct Gatekeeper {
    backend: Arc<dyn ChatBackend>,
    profiles: Arc<dyn ProfileDirectory>,
    recorder: AuditRecorder,
    config: GateConfig,
    events: Arc<dyn EventHandler>,
}

impl Gatekeeper {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        profiles: Arc<dyn ProfileDirectory>,
        store: Arc<dyn AuditStore>,
        config: GateConfig,
    ) -> Self {
        Self {
            backend,
            profiles,
            recorder: AuditRecorder::new(store),
            config,
            events: Arc::new(LoggingHandler),
        }
    }

    /// Build the provider client and audit store the config describes.
    pub fn from_config(
        config: GateConfig,
        api_key: Option<&str>,
        profiles: Arc<dyn ProfileDirectory>,
    ) -> GateResult<Self> {
        let backend = config.connect(api_key)?;
        let store: Arc<dyn AuditStore> = match &config.audit_dir {
            Some(dir) => Arc::new(JsonlAuditStore::open(dir)?),
            None => Arc::new(MemoryAuditStore::new()),
        };
        Ok(Self::new(backend, profiles, store, config))
    }

    pub fn with_events(mut self, handler: impl EventHandler + 'static) -> Self {
        self.events = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn audit_store(&self) -> &Arc<dyn AuditStore> {
        self.recorder.store()
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Run one interaction through screen → compose → validate.
    ///
    /// Unknown strategy names fail before any model call. Audit write
    /// failures are reported through [`GateEvent::AuditFailed`] and do not
    /// stop the interaction.
    pub async fn run(&self, interaction: &Interaction) -> GateResult<GateOutcome> {
        strategy::resolve(&interaction.strategies)?;

        let owner = interaction.whitelist_owner();
        let whitelist = self.profiles.get_prompt_for(owner)?;
        let system_prompt = whitelist.system_prompt();
        self.events.on_event(&GateEvent::PromptBuilt {
            child_id: owner,
            features: whitelist.recognized().len(),
        });

        let backend = self.backend.as_ref();
        let config = &self.config;
        let screening = self
            .with_retry("screening", || {
                moderation::screen_at(
                    backend,
                    &interaction.child_prompt,
                    &system_prompt,
                    &config.judge_model,
                    config.judge_temperature,
                )
            })
            .await?;
        self.events.on_event(&GateEvent::Screened { verdict: &screening });
        self.audit(|| {
            self.recorder
                .record_screening(
                    &interaction.context,
                    &interaction.child_prompt,
                    &system_prompt,
                    &screening,
                )
                .map(|_| ())
        });

        if !screening.is_compliant {
            self.events.on_event(&GateEvent::Refused { verdict: &screening });
            info!(user = %interaction.context.user_id, "Interaction refused at screening");
            return Ok(GateOutcome::Refused {
                screening,
                message: DEFERRAL_REPLY.to_string(),
            });
        }

        let request = interaction.compose_request(config);
        let mode = request.mode();
        let result = self
            .with_retry("composition", || moderation::compose(backend, &request))
            .await?;
        self.events.on_event(&GateEvent::Composed {
            mode,
            result: &result,
        });

        let validation_request = ValidationRequest::new(
            result.refactored_response.as_str(),
            system_prompt.as_str(),
        )
        .with_child_prompt(interaction.child_prompt.as_str())
        .with_model(config.judge_model.as_str());
        let validation = self
            .with_retry("validation", || {
                moderation::validate_at(backend, &validation_request, config.judge_temperature)
            })
            .await?;
        self.events.on_event(&GateEvent::Validated {
            verdict: &validation,
        });

        let proposed = config.block_policy.decide(&validation);
        let was_blocked = match self.events.on_event(&GateEvent::BlockDecision {
            verdict: &validation,
            proposed,
        }) {
            Some(EventResponse::Block) => true,
            Some(EventResponse::Deliver) => false,
            None => proposed,
        };
        self.audit(|| {
            self.recorder
                .record_validation(
                    &interaction.context,
                    &validation_request,
                    &validation,
                    was_blocked,
                )
                .map(|_| ())
        });

        if was_blocked {
            let overridden = was_blocked != validation.should_block;
            self.events.on_event(&GateEvent::Blocked { overridden });
            Ok(GateOutcome::Blocked {
                screening,
                result,
                validation,
                message: DEFERRAL_REPLY.to_string(),
                overridden,
            })
        } else {
            self.events.on_event(&GateEvent::Delivered);
            Ok(GateOutcome::Delivered {
                screening,
                result,
                validation,
            })
        }
    }

    fn audit(&self, write: impl FnOnce() -> GateResult<()>) {
        if let Err(e) = write() {
            let message = e.to_string();
            warn!(error = %message, "Audit write failed");
            self.events.on_event(&GateEvent::AuditFailed { error: &message });
        }
    }

    async fn with_retry<T, F, Fut>(&self, stage: &'static str, mut op: F) -> GateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GateResult<T>>,
    {
        let retry = self.config.retry_config();
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < retry.max_retries && e.is_transient() => {
                    let message = e.to_string();
                    self.events.on_event(&GateEvent::Retrying {
                        stage,
                        attempt: attempt + 1,
                        error: &message,
                    });
                    tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedBackend;
    use crate::audit::test_support::validation;
    use crate::moderation::Severity;
    use crate::profile::MemoryProfiles;
    use crate::whitelist::FeatureWhitelist;
    use serde_json::json;

    fn compliant() -> serde_json::Value {
        json!({"is_compliant": true, "concern_level": "none", "concerns": [], "reasoning": "ok"})
    }

    fn composed() -> serde_json::Value {
        json!({"refactored_response": "Try splitting the pizza!", "system_prompt_rule": "Guide."})
    }

    fn gatekeeper(backend: Arc<ScriptedBackend>, config: GateConfig) -> (Gatekeeper, Arc<MemoryAuditStore>) {
        let profiles = Arc::new(
            MemoryProfiles::new().with_child("kid", FeatureWhitelist::new(["school_assignment"])),
        );
        let store = Arc::new(MemoryAuditStore::new());
        let gate = Gatekeeper::new(backend, profiles, store.clone(), config).with_events(NoopHandler);
        (gate, store)
    }

    fn interaction() -> Interaction {
        Interaction::new(AuditContext::new("kid-account").with_child("kid"), "what is 1/2?")
    }

    #[test]
    fn policy_decisions() {
        let soft = ValidationVerdict {
            violations: vec!["minor".into()],
            ..validation(false)
        };
        assert!(BlockPolicy::FollowRecommendation.decide(&validation(true)));
        assert!(!BlockPolicy::FollowRecommendation.decide(&soft));
        assert!(!BlockPolicy::AuditOnly.decide(&validation(true)));
        assert!(BlockPolicy::BlockAnyViolation.decide(&soft));
        assert!(!BlockPolicy::BlockAnyViolation.decide(&validation(false)));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("audit-only".parse::<BlockPolicy>().unwrap(), BlockPolicy::AuditOnly);
        assert_eq!("strict".parse::<BlockPolicy>().unwrap(), BlockPolicy::BlockAnyViolation);
        assert!("sometimes".parse::<BlockPolicy>().is_err());
    }

    #[test]
    fn numeric_age_uses_group_label() {
        let i = interaction().with_child_age_years(10);
        assert_eq!(i.child_age.as_deref(), Some("9-12 years"));
    }

    #[tokio::test]
    async fn delivered_after_three_calls() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_json(compliant())
                .with_json(composed())
                .with_json(json!({"is_compliant": true, "severity": "none", "violations": [],
                                  "reasoning": "fine", "should_block": false})),
        );
        let (gate, store) = gatekeeper(backend.clone(), GateConfig::default());
        let outcome = gate.run(&interaction()).await.unwrap();

        assert!(outcome.is_delivered());
        assert_eq!(outcome.reply_text(), "Try splitting the pizza!");
        assert_eq!(backend.call_count(), 3);

        let recent = store.list_recent("kid-account", 10).unwrap();
        assert_eq!(recent.prompt_checks.len(), 1);
        assert_eq!(recent.validation_checks.len(), 1);
        assert!(!recent.validation_checks[0].was_blocked);
        assert!(recent.prompt_checks[0].system_prompt.contains("School assignments"));
    }

    #[tokio::test]
    async fn refused_prompt_skips_generation() {
        let backend = Arc::new(ScriptedBackend::new().with_json(json!({
            "is_compliant": false, "concern_level": "high",
            "concerns": ["override"], "reasoning": "jailbreak"
        })));
        let (gate, store) = gatekeeper(backend.clone(), GateConfig::default());
        let outcome = gate.run(&interaction()).await.unwrap();

        assert!(matches!(outcome, GateOutcome::Refused { .. }));
        assert_eq!(outcome.reply_text(), DEFERRAL_REPLY);
        assert_eq!(backend.call_count(), 1);
        assert!(store.list_recent("kid-account", 10).unwrap().validation_checks.is_empty());
    }

    #[tokio::test]
    async fn blocked_on_recommendation() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_json(compliant())
                .with_json(composed())
                .with_json(json!({"is_compliant": false, "severity": "high",
                                  "violations": ["unsafe"], "reasoning": "r", "should_block": true})),
        );
        let (gate, store) = gatekeeper(backend, GateConfig::default());
        let outcome = gate.run(&interaction()).await.unwrap();

        match &outcome {
            GateOutcome::Blocked { overridden, validation, .. } => {
                assert!(!overridden);
                assert_eq!(validation.severity, Severity::High);
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(outcome.reply_text(), DEFERRAL_REPLY);
        assert!(store.recent_validation_checks("kid-account", 1).unwrap()[0].was_blocked);
    }

    #[tokio::test]
    async fn audit_only_records_divergence() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_json(compliant())
                .with_json(composed())
                .with_json(json!({"is_compliant": false, "severity": "medium",
                                  "violations": ["x"], "reasoning": "r", "should_block": true})),
        );
        let config = GateConfig::default().with_block_policy(BlockPolicy::AuditOnly);
        let (gate, store) = gatekeeper(backend, config);
        let outcome = gate.run(&interaction()).await.unwrap();

        assert!(outcome.is_delivered());
        let check = &store.recent_validation_checks("kid-account", 1).unwrap()[0];
        assert!(check.verdict.should_block);
        assert!(!check.was_blocked);
    }

    #[tokio::test]
    async fn handler_override_blocks() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_json(compliant())
                .with_json(composed())
                .with_json(json!({"is_compliant": true, "severity": "none", "violations": [],
                                  "reasoning": "r", "should_block": false})),
        );
        let (gate, store) = gatekeeper(backend, GateConfig::default());
        let gate = gate.with_events(FnEventHandler::new(|event: &GateEvent<'_>| match event {
            GateEvent::BlockDecision { .. } => Some(EventResponse::Block),
            _ => None,
        }));
        let outcome = gate.run(&interaction()).await.unwrap();

        assert!(matches!(outcome, GateOutcome::Blocked { overridden: true, .. }));
        let check = &store.recent_validation_checks("kid-account", 1).unwrap()[0];
        assert!(check.was_blocked && !check.verdict.should_block);
    }

    #[tokio::test]
    async fn unknown_strategy_makes_no_calls() {
        let backend = Arc::new(ScriptedBackend::new().with_json(compliant()));
        let (gate, _) = gatekeeper(backend.clone(), GateConfig::default());
        let err = gate
            .run(&interaction().with_strategies(["Not A Real Strategy"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::UnknownStrategy(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_failure(Some(503), "busy")
                .with_json(compliant()),
        );
        let (gate, _) = gatekeeper(backend.clone(), GateConfig::default());
        let err = gate.run(&interaction()).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried_when_configured() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_failure(Some(429), "slow down")
                .with_json(compliant())
                .with_json(composed())
                .with_json(json!({"should_block": false})),
        );
        let (gate, _) = gatekeeper(backend.clone(), GateConfig::default().with_retries(2));
        let outcome = gate.run(&interaction()).await.unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn auth_failure_not_retried() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_failure(Some(401), "bad key")
                .with_json(compliant()),
        );
        let (gate, _) = gatekeeper(backend.clone(), GateConfig::default().with_retries(3));
        assert!(gate.run(&interaction()).await.is_err());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_child_uses_fallback_prompt() {
        let backend = Arc::new(
            ScriptedBackend::new().with_json(json!({
                "is_compliant": false, "concern_level": "medium",
                "concerns": ["nothing whitelisted"], "reasoning": "r"
            })),
        );
        let (gate, _) = gatekeeper(backend.clone(), GateConfig::default());
        let i = Interaction::new(AuditContext::new("stranger"), "tell me a joke");
        let outcome = gate.run(&i).await.unwrap();
        assert!(matches!(outcome, GateOutcome::Refused { .. }));
        assert!(backend.requests()[0].messages[1]
            .content
            .contains(crate::whitelist::EMPTY_WHITELIST_PROMPT));
    }
}
