//! Convenience re-exports for common `kidgate` types.
//!
//! ```ignore
//! use kidgate::prelude::*;
//! ```
//!
//! Pulls in the whitelist builder, the three moderation stages and their
//! verdicts, the [`Gatekeeper`] with its events, the audit seam, and the
//! backend trait. Provider clients and prompt internals stay in their
//! modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::api::{ChatBackend, ScriptedBackend};
pub use crate::config::GateConfig;
pub use crate::{DEFERRAL_REPLY, GateError, GateResult, Message};

// ── Whitelist ───────────────────────────────────────────────────────
pub use crate::whitelist::{FeatureWhitelist, build_system_prompt};

// ── Moderation stages ───────────────────────────────────────────────
pub use crate::moderation::{
    ComplianceVerdict, ComposeMode, ComposeRequest, ConcernLevel, ModerationResult, Severity,
    Strategy, ValidationRequest, ValidationVerdict, compose, screen, suggest_followup, validate,
};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::gate::{
    BlockPolicy, CompositeEventHandler, EventHandler, EventResponse, FnEventHandler, GateEvent,
    GateOutcome, Gatekeeper, Interaction, LoggingHandler, NoopHandler,
};

// ── Audit & profiles ────────────────────────────────────────────────
pub use crate::audit::{AuditContext, AuditRecorder, AuditStore, JsonlAuditStore, MemoryAuditStore};
pub use crate::profile::{MemoryProfiles, ProfileDirectory};
