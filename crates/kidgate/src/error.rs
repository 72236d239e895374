//! Error taxonomy for the gate.
//!
//! A partially empty judge reply is not an error: it becomes a verdict with
//! defaulted fields (see [`ComplianceVerdict::defaulted_fields`](crate::moderation::ComplianceVerdict::defaulted_fields)).

use thiserror::Error;

/// Errors surfaced by the gate and its collaborator seams.
#[derive(Debug, Error)]
pub enum GateError {
    /// No usable credential or setting. Not retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A moderation strategy name that is not in the catalog.
    #[error("unknown moderation strategy: {0}")]
    UnknownStrategy(String),

    /// The model call failed, or its reply was not JSON at all.
    #[error("upstream error{}: {message}", http_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
        /// No reply was read: the connection or the body read failed.
        transport: bool,
    },

    /// The audit store rejected a write or read.
    #[error("audit store error: {0}")]
    Audit(String),

    /// The profile/settings collaborator failed.
    #[error("profile error: {0}")]
    Profile(String),
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl GateError {
    /// A reply arrived but was unusable (API error object, not JSON, empty).
    pub fn upstream(message: impl Into<String>) -> Self {
        GateError::Upstream {
            status: None,
            message: message.into(),
            transport: false,
        }
    }

    /// The request did not complete: connect failure, timeout, or a body
    /// that could not be read.
    pub fn transport(message: impl Into<String>) -> Self {
        GateError::Upstream {
            status: None,
            message: message.into(),
            transport: true,
        }
    }

    /// Upstream failure carrying the provider's HTTP status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        GateError::Upstream {
            status: Some(status),
            message: message.into(),
            transport: false,
        }
    }

    /// HTTP status of an upstream failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            GateError::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry this error.
    ///
    /// See [`api::retry::is_transient`](crate::api::retry::is_transient).
    pub fn is_transient(&self) -> bool {
        crate::api::retry::is_transient(self)
    }
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;
