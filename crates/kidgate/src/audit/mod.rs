//! Append-only audit trail of screening and validation verdicts.
//!
//! Every verdict is stored verbatim with the actor that triggered it, a fresh
//! identity and a creation timestamp. Records are never updated or deleted.
//! Composed replies are not audited here; the caller decides whether to keep
//! a [`ModerationResult`](crate::moderation::ModerationResult).

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlAuditStore;
pub use memory::MemoryAuditStore;

use crate::GateResult;
use crate::moderation::{ComplianceVerdict, ValidationRequest, ValidationVerdict};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

// ── Timestamps ─────────────────────────────────────────────────────

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock nanoseconds since the epoch, strictly increasing across calls
/// within this process.
pub fn monotonic_timestamp() -> i64 {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Records ────────────────────────────────────────────────────────

/// Who an interaction belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    /// Account that sent the prompt.
    pub user_id: String,
    /// Child profile, when the account is acting for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    /// Caller-maintained session counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_number: Option<i64>,
}

impl AuditContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, child_id: impl Into<String>) -> Self {
        self.child_id = Some(child_id.into());
        self
    }

    pub fn with_session(mut self, session_number: i64) -> Self {
        self.session_number = Some(session_number);
        self
    }
}

/// A screening verdict and the two prompts it compared.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PromptComparisonCheck {
    pub id: String,
    #[serde(flatten)]
    pub context: AuditContext,
    pub child_prompt: String,
    pub system_prompt: String,
    #[serde(flatten)]
    pub verdict: ComplianceVerdict,
    /// Nanoseconds since the epoch.
    pub created_at: i64,
}

/// A validation verdict plus what the caller actually did with it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseValidationCheck {
    pub id: String,
    #[serde(flatten)]
    pub context: AuditContext,
    pub response_text: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_child_prompt: Option<String>,
    #[serde(flatten)]
    pub verdict: ValidationVerdict,
    /// Whether the reply was withheld. May differ from
    /// `verdict.should_block` when the caller overrode the recommendation.
    pub was_blocked: bool,
    /// Nanoseconds since the epoch.
    pub created_at: i64,
}

impl ResponseValidationCheck {
    /// The caller did not do what the validator recommended.
    pub fn overrode_recommendation(&self) -> bool {
        self.was_blocked != self.verdict.should_block
    }
}

/// Either record kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    PromptComparison(PromptComparisonCheck),
    ResponseValidation(ResponseValidationCheck),
}

impl AuditRecord {
    pub fn id(&self) -> &str {
        match self {
            AuditRecord::PromptComparison(r) => &r.id,
            AuditRecord::ResponseValidation(r) => &r.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            AuditRecord::PromptComparison(r) => &r.context.user_id,
            AuditRecord::ResponseValidation(r) => &r.context.user_id,
        }
    }

    pub fn created_at(&self) -> i64 {
        match self {
            AuditRecord::PromptComparison(r) => r.created_at,
            AuditRecord::ResponseValidation(r) => r.created_at,
        }
    }
}

/// Recent records of both kinds for one user, newest first.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RecentChecks {
    pub prompt_checks: Vec<PromptComparisonCheck>,
    pub validation_checks: Vec<ResponseValidationCheck>,
}

// ── Store seam ─────────────────────────────────────────────────────

/// Append-only record store.
///
/// Implementations only need insert atomicity; records are never updated.
pub trait AuditStore: Send + Sync {
    fn append(&self, record: AuditRecord) -> GateResult<()>;

    /// Up to `limit` screening records for `user_id`, newest first.
    fn recent_prompt_checks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> GateResult<Vec<PromptComparisonCheck>>;

    /// Up to `limit` validation records for `user_id`, newest first.
    fn recent_validation_checks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> GateResult<Vec<ResponseValidationCheck>>;

    fn list_recent(&self, user_id: &str, limit: usize) -> GateResult<RecentChecks> {
        Ok(RecentChecks {
            prompt_checks: self.recent_prompt_checks(user_id, limit)?,
            validation_checks: self.recent_validation_checks(user_id, limit)?,
        })
    }
}

/// Keep records for `user_id`, newest first, at most `limit`.
pub(crate) fn newest_for_user<T>(
    records: impl IntoIterator<Item = T>,
    user_id: &str,
    limit: usize,
    user_of: impl Fn(&T) -> &str,
    created_at: impl Fn(&T) -> i64,
) -> Vec<T> {
    let mut matching: Vec<T> = records
        .into_iter()
        .filter(|r| user_of(r) == user_id)
        .collect();
    matching.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    matching.truncate(limit);
    matching
}

// ── Recorder ───────────────────────────────────────────────────────

/// Builds records from verdicts and appends them to a store.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn record_screening(
        &self,
        context: &AuditContext,
        child_prompt: &str,
        system_prompt: &str,
        verdict: &ComplianceVerdict,
    ) -> GateResult<PromptComparisonCheck> {
        let check = PromptComparisonCheck {
            id: new_id(),
            context: context.clone(),
            child_prompt: child_prompt.to_string(),
            system_prompt: system_prompt.to_string(),
            verdict: verdict.clone(),
            created_at: monotonic_timestamp(),
        };
        self.store
            .append(AuditRecord::PromptComparison(check.clone()))?;
        debug!(id = %check.id, user = %context.user_id, "Recorded prompt comparison");
        Ok(check)
    }

    pub fn record_validation(
        &self,
        context: &AuditContext,
        request: &ValidationRequest,
        verdict: &ValidationVerdict,
        was_blocked: bool,
    ) -> GateResult<ResponseValidationCheck> {
        let check = ResponseValidationCheck {
            id: new_id(),
            context: context.clone(),
            response_text: request.response_text.clone(),
            system_prompt: request.whitelist_system_prompt.clone(),
            original_child_prompt: request.original_child_prompt.clone(),
            verdict: verdict.clone(),
            was_blocked,
            created_at: monotonic_timestamp(),
        };
        self.store
            .append(AuditRecord::ResponseValidation(check.clone()))?;
        debug!(
            id = %check.id,
            user = %context.user_id,
            should_block = verdict.should_block,
            was_blocked,
            "Recorded response validation"
        );
        Ok(check)
    }
}
