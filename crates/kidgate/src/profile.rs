//! Profile/settings collaborator seam.
//!
//! The gate only ever reads a child's [`FeatureWhitelist`] and writes a
//! rebuilt system prompt to a user's settings. Everything else about
//! profiles belongs to the host application.

use crate::whitelist::FeatureWhitelist;
use crate::{GateError, GateResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

pub trait ProfileDirectory: Send + Sync {
    /// The whitelist currently selected for a child.
    fn get_prompt_for(&self, child_id: &str) -> GateResult<FeatureWhitelist>;

    /// Store a system prompt in a user's settings.
    fn write_system_prompt(&self, user_id: &str, prompt: &str) -> GateResult<()>;
}

/// Outcome of pushing a rebuilt prompt to several accounts.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub prompt: String,
    pub written: Vec<String>,
    /// `(user_id, error message)` for each target that failed.
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn all_written(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rebuild a child's system prompt and write it to each target user.
///
/// Targets are typically the child's own account and, for preview, the
/// parent's. A failing target does not stop the others. Only a failure to
/// read the whitelist is an error.
pub fn sync_system_prompt<S: AsRef<str>>(
    directory: &dyn ProfileDirectory,
    child_id: &str,
    targets: &[S],
) -> GateResult<SyncReport> {
    let prompt = directory.get_prompt_for(child_id)?.system_prompt();
    let mut written = Vec::new();
    let mut failed = Vec::new();

    for target in targets.iter().map(|t| t.as_ref()) {
        match directory.write_system_prompt(target, &prompt) {
            Ok(()) => written.push(target.to_string()),
            Err(e) => {
                warn!(user = target, error = %e, "Failed to write system prompt");
                failed.push((target.to_string(), e.to_string()));
            }
        }
    }

    info!(
        child = child_id,
        written = written.len(),
        failed = failed.len(),
        "System prompt synced"
    );
    Ok(SyncReport {
        prompt,
        written,
        failed,
    })
}

/// In-memory profiles for tests and the CLI.
///
/// Unknown children read as an empty whitelist.
#[derive(Default)]
pub struct MemoryProfiles {
    whitelists: RwLock<HashMap<String, FeatureWhitelist>>,
    prompts: RwLock<HashMap<String, String>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child(self, child_id: impl Into<String>, whitelist: FeatureWhitelist) -> Self {
        self.set_whitelist(child_id, whitelist);
        self
    }

    /// Replace a child's whitelist, as a parent edit would.
    pub fn set_whitelist(&self, child_id: impl Into<String>, whitelist: FeatureWhitelist) {
        self.whitelists
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(child_id.into(), whitelist);
    }

    /// The prompt last written for a user.
    pub fn system_prompt_of(&self, user_id: &str) -> Option<String> {
        self.prompts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned()
    }
}

impl ProfileDirectory for MemoryProfiles {
    fn get_prompt_for(&self, child_id: &str) -> GateResult<FeatureWhitelist> {
        Ok(self
            .whitelists
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(child_id)
            .cloned()
            .unwrap_or_default())
    }

    fn write_system_prompt(&self, user_id: &str, prompt: &str) -> GateResult<()> {
        if user_id.trim().is_empty() {
            return Err(GateError::Profile("user id must not be empty".into()));
        }
        self.prompts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), prompt.to_string());
        Ok(())
    }
}
