//! Events emitted by the [`Gatekeeper`](super::Gatekeeper).
//!
//! Callers implement [`EventHandler`] to observe each stage of an
//! interaction. A handler may answer [`GateEvent::BlockDecision`] with an
//! [`EventResponse`] to override the configured block policy; the override is
//! recorded as `was_blocked` next to the validator's recommendation.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures |
//! | [`CompositeEventHandler`] | Several handlers in order |

use crate::moderation::{ComplianceVerdict, ComposeMode, ModerationResult, ValidationVerdict};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum GateEvent<'a> {
    /// System prompt rebuilt from the child's whitelist.
    PromptBuilt { child_id: &'a str, features: usize },
    Screened { verdict: &'a ComplianceVerdict },
    /// Screening failed; nothing is generated.
    Refused { verdict: &'a ComplianceVerdict },
    Composed {
        mode: ComposeMode,
        result: &'a ModerationResult,
    },
    Validated { verdict: &'a ValidationVerdict },
    /// The policy's proposed decision, before delivery. Handlers may override.
    BlockDecision {
        verdict: &'a ValidationVerdict,
        proposed: bool,
    },
    Delivered,
    Blocked { overridden: bool },
    /// A transient upstream failure is about to be retried.
    Retrying {
        stage: &'static str,
        attempt: u32,
        error: &'a str,
    },
    /// An audit write failed; the interaction continues.
    AuditFailed { error: &'a str },
}

/// Handler answer to [`GateEvent::BlockDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    Deliver,
    Block,
}

pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &GateEvent<'_>) -> Option<EventResponse> {
        let _ = event;
        None
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// Wraps a closure as a handler.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&GateEvent<'_>) -> Option<EventResponse> + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&GateEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&GateEvent<'_>) -> Option<EventResponse> + Send + Sync,
{
    fn on_event(&self, event: &GateEvent<'_>) -> Option<EventResponse> {
        (self.0)(event)
    }
}

/// Runs handlers in order; the first `Some` response wins.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &GateEvent<'_>) -> Option<EventResponse> {
        // Every handler sees the event, even after one has answered.
        let mut answer = None;
        for handler in &self.handlers {
            let response = handler.on_event(event);
            if answer.is_none() {
                answer = response;
            }
        }
        answer
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &GateEvent<'_>) -> Option<EventResponse> {
        match event {
            GateEvent::PromptBuilt { child_id, features } => {
                debug!("Built system prompt for {child_id} ({features} recognised feature(s))");
            }
            GateEvent::Screened { verdict } => {
                info!(
                    "Screened: compliant={} concern={}",
                    verdict.is_compliant, verdict.concern_level
                );
            }
            GateEvent::Refused { verdict } => {
                info!(
                    "Refused before generation ({} concern(s))",
                    verdict.concerns.len()
                );
            }
            GateEvent::Composed { mode, result } => {
                debug!(
                    "Composed ({mode:?}): {} chars, {} strategy label(s)",
                    result.refactored_response.chars().count(),
                    result.applied_strategies.len()
                );
            }
            GateEvent::Validated { verdict } => {
                info!(
                    "Validated: severity={} should_block={}",
                    verdict.severity, verdict.should_block
                );
            }
            GateEvent::BlockDecision { proposed, .. } => {
                debug!("Proposed block decision: {proposed}");
            }
            GateEvent::Delivered => info!("Reply delivered"),
            GateEvent::Blocked { overridden } => {
                info!("Reply blocked{}", if *overridden { " (override)" } else { "" });
            }
            GateEvent::Retrying {
                stage,
                attempt,
                error,
            } => {
                warn!("Retrying {stage} (attempt {attempt}): {error}");
            }
            GateEvent::AuditFailed { error } => {
                warn!("Audit write failed: {error}");
            }
        }
        None
    }
}
