//! The model-judged stages: screening, composition, validation.
//!
//! Every stage makes exactly one call through [`judge::run`] and never
//! retries. Sequencing the stages is the caller's job (see
//! [`crate::gate::Gatekeeper`]).

pub mod composer;
pub mod followup;
pub mod judge;
pub mod screener;
pub mod strategy;
pub mod validator;
pub mod verdict;

pub use composer::{ComposeMode, ComposeRequest, ModerationResult, compose};
pub use followup::suggest_followup;
pub use screener::{screen, screen_at};
pub use strategy::Strategy;
pub use validator::{ValidationRequest, validate, validate_at};
pub use verdict::{ComplianceVerdict, ConcernLevel, Severity, ValidationVerdict};
