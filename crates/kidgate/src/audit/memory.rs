//! In-memory [`AuditStore`].

use super::{
    AuditRecord, AuditStore, PromptComparisonCheck, ResponseValidationCheck, newest_for_user,
};
use crate::GateResult;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryAuditStore {
    prompt_checks: Mutex<Vec<PromptComparisonCheck>>,
    validation_checks: Mutex<Vec<ResponseValidationCheck>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held, both kinds.
    pub fn len(&self) -> usize {
        self.prompt_checks.lock().unwrap_or_else(|e| e.into_inner()).len()
            + self
                .validation_checks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, record: AuditRecord) -> GateResult<()> {
        match record {
            AuditRecord::PromptComparison(r) => self
                .prompt_checks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(r),
            AuditRecord::ResponseValidation(r) => self
                .validation_checks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(r),
        }
        Ok(())
    }

    fn recent_prompt_checks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> GateResult<Vec<PromptComparisonCheck>> {
        let records = self
            .prompt_checks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(newest_for_user(
            records,
            user_id,
            limit,
            |r| r.context.user_id.as_str(),
            |r| r.created_at,
        ))
    }

    fn recent_validation_checks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> GateResult<Vec<ResponseValidationCheck>> {
        let records = self
            .validation_checks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(newest_for_user(
            records,
            user_id,
            limit,
            |r| r.context.user_id.as_str(),
            |r| r.created_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::test_support::*;
    use crate::audit::{AuditContext, AuditRecorder};
    use crate::moderation::ValidationRequest;
    use std::sync::Arc;

    #[test]
    fn newest_first_with_limit_per_user() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let alice = AuditContext::new("alice");
        let bob = AuditContext::new("bob");

        for prompt in ["one", "two", "three"] {
            recorder
                .record_screening(&alice, prompt, "s", &compliance(true))
                .unwrap();
        }
        recorder
            .record_screening(&bob, "bob's", "s", &compliance(true))
            .unwrap();

        let recent = store.recent_prompt_checks("alice", 2).unwrap();
        let prompts: Vec<&str> = recent.iter().map(|r| r.child_prompt.as_str()).collect();
        assert_eq!(prompts, vec!["three", "two"]);
        assert_eq!(store.recent_prompt_checks("bob", 10).unwrap().len(), 1);
        assert!(store.recent_prompt_checks("carol", 10).unwrap().is_empty());
    }

    #[test]
    fn list_recent_covers_both_kinds() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone());
        let ctx = AuditContext::new("u");
        recorder.record_screening(&ctx, "p", "s", &compliance(true)).unwrap();
        recorder
            .record_validation(&ctx, &ValidationRequest::new("r", "s"), &validation(false), false)
            .unwrap();

        let recent = store.list_recent("u", 10).unwrap();
        assert_eq!(recent.prompt_checks.len(), 1);
        assert_eq!(recent.validation_checks.len(), 1);
        assert_eq!(store.len(), 2);
    }
}
