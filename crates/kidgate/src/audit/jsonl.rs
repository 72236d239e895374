//! JSON Lines [`AuditStore`].
//!
//! Layout:
//! ```text
//! audit_dir/
//!   prompt_comparison_checks.jsonl
//!   response_validation_checks.jsonl
//! ```
//!
//! One record per line, appended with a single write while the store's lock
//! is held. Unreadable lines are skipped with a warning on read.

use super::{
    AuditRecord, AuditStore, PromptComparisonCheck, ResponseValidationCheck, newest_for_user,
};
use crate::{GateError, GateResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const PROMPT_CHECKS_FILE: &str = "prompt_comparison_checks.jsonl";
pub const VALIDATION_CHECKS_FILE: &str = "response_validation_checks.jsonl";

pub struct JsonlAuditStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> GateResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            GateError::Audit(format!("Failed to create audit dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_line<T: Serialize>(&self, file: &str, record: &T) -> GateResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| GateError::Audit(format!("Failed to serialize record: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GateError::Audit(format!("Failed to open {}: {e}", path.display())))?;
        handle
            .write_all(line.as_bytes())
            .map_err(|e| GateError::Audit(format!("Failed to write {}: {e}", path.display())))?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, file: &str) -> GateResult<Vec<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let handle = std::fs::File::open(&path)
            .map_err(|e| GateError::Audit(format!("Failed to open {}: {e}", path.display())))?;

        let mut records = Vec::new();
        for (n, line) in BufReader::new(handle).lines().enumerate() {
            let line = line
                .map_err(|e| GateError::Audit(format!("Failed to read {}: {e}", path.display())))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed line {} in {}: {e}", n + 1, path.display()),
            }
        }
        Ok(records)
    }
}

impl AuditStore for JsonlAuditStore {
    fn append(&self, record: AuditRecord) -> GateResult<()> {
        match &record {
            AuditRecord::PromptComparison(r) => self.append_line(PROMPT_CHECKS_FILE, r),
            AuditRecord::ResponseValidation(r) => self.append_line(VALIDATION_CHECKS_FILE, r),
        }
    }

    fn recent_prompt_checks(
        &self,
        user_id: &str,
        limit: usize,
    ) -> GateResult<Vec<PromptComparisonCheck>> {
        let records: Vec<PromptComparisonCheck> = self.read_all(PROMPT_CHECKS_FILE)?;
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
        let records: Vec<ResponseValidationCheck> = self.read_all(VALIDATION_CHECKS_FILE)?;
        Ok(newest_for_user(
            records,
            user_id,
            limit,
            |r| r.context.user_id.as_str(),
            |r| r.created_at,
        ))
    }
}
