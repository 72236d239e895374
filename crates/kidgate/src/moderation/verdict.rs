//! Verdicts returned by the screening and validation judges.
//!
//! Judge replies are read field by field through [`FieldReader`]. A field
//! that is missing or has the wrong shape takes the fixed baseline value and
//! its name is recorded in `defaulted_fields`; a verdict with any defaulted
//! field is *degraded*. Degradation is reported, never escalated: it never
//! turns a reply into an error and never invents a harsher verdict than the
//! baseline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

// ── Levels ─────────────────────────────────────────────────────────

/// How worried the screener is about a child prompt.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ConcernLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ConcernLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcernLevel::None => "none",
            ConcernLevel::Low => "low",
            ConcernLevel::Medium => "medium",
            ConcernLevel::High => "high",
        }
    }
}

impl FromStr for ConcernLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ConcernLevel::None),
            "low" => Ok(ConcernLevel::Low),
            "medium" => Ok(ConcernLevel::Medium),
            "high" => Ok(ConcernLevel::High),
            // The validator's top level; clamp rather than reject.
            "critical" => Ok(ConcernLevel::High),
            other => Err(format!("unknown concern level '{other}'")),
        }
    }
}

impl std::fmt::Display for ConcernLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious the validator finds a reply's violations.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// The judge is told to recommend blocking at this level or above.
    pub fn warrants_block(&self) -> bool {
        *self >= Severity::Medium
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Verdicts ───────────────────────────────────────────────────────

/// Pre-generation verdict on a child prompt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ComplianceVerdict {
    pub is_compliant: bool,
    pub concern_level: ConcernLevel,
    pub concerns: Vec<String>,
    pub reasoning: String,
    pub model_used: String,
    /// Fields the judge left out or malformed, filled with baseline values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<String>,
}

impl ComplianceVerdict {
    /// Read a verdict from a parsed judge reply.
    ///
    /// Baseline: compliant, concern `none`, no concerns, empty reasoning.
    /// An unrecognised concern label takes the baseline like a missing one.
    pub fn from_fields(fields: Map<String, Value>, model_used: impl Into<String>) -> Self {
        let mut reader = FieldReader::new(fields);
        let verdict = Self {
            is_compliant: reader.bool("is_compliant", true),
            concern_level: reader.level("concern_level", ConcernLevel::None),
            concerns: reader.string_list("concerns"),
            reasoning: reader.string("reasoning"),
            model_used: model_used.into(),
            defaulted_fields: Vec::new(),
        };
        Self {
            defaulted_fields: reader.into_defaulted(),
            ..verdict
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.defaulted_fields.is_empty()
    }
}

/// Post-generation verdict on a composed reply.
///
/// `should_block` is a recommendation. Whether the reply was actually
/// withheld is recorded separately by the caller (see
/// [`ResponseValidationCheck::was_blocked`](crate::audit::ResponseValidationCheck::was_blocked)).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_compliant: bool,
    pub severity: Severity,
    pub violations: Vec<String>,
    pub reasoning: String,
    pub should_block: bool,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<String>,
}

impl ValidationVerdict {
    /// Read a verdict from a parsed judge reply.
    ///
    /// Baseline: compliant, severity `none`, no violations, empty reasoning,
    /// no block recommendation. An unrecognised severity label takes the
    /// baseline. The judge's `should_block` is taken as given.
    pub fn from_fields(fields: Map<String, Value>, model_used: impl Into<String>) -> Self {
        let mut reader = FieldReader::new(fields);
        let verdict = Self {
            is_compliant: reader.bool("is_compliant", true),
            severity: reader.level("severity", Severity::None),
            violations: reader.string_list("violations"),
            reasoning: reader.string("reasoning"),
            should_block: reader.bool("should_block", false),
            model_used: model_used.into(),
            defaulted_fields: Vec::new(),
        };
        Self {
            defaulted_fields: reader.into_defaulted(),
            ..verdict
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.defaulted_fields.is_empty()
    }
}

// ── Field reading ──────────────────────────────────────────────────

/// Lenient reader over a judge's JSON object that remembers which fields it
/// had to default.
pub(crate) struct FieldReader {
    fields: Map<String, Value>,
    defaulted: Vec<String>,
}

impl FieldReader {
    pub(crate) fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            defaulted: Vec::new(),
        }
    }

    fn default_for(&mut self, key: &str) {
        self.defaulted.push(key.to_string());
    }

    /// Booleans, plus `"true"` / `"false"` strings.
    pub(crate) fn bool(&mut self, key: &str, default: bool) -> bool {
        match self.fields.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => true,
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => false,
            _ => {
                self.default_for(key);
                default
            }
        }
    }

    /// Strings; numbers and booleans are stringified, anything else defaults
    /// to empty. A missing key also defaults to empty.
    pub(crate) fn string(&mut self, key: &str) -> String {
        match self.fields.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => {
                self.default_for(key);
                String::new()
            }
        }
    }

    /// Lists of strings. A lone string becomes a one-item list; non-string
    /// items are stringified; blank items are dropped.
    pub(crate) fn string_list(&mut self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.trim().is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            Some(Value::String(_)) => Vec::new(),
            _ => {
                self.default_for(key);
                Vec::new()
            }
        }
    }

    /// An enumerated level, or `baseline` when absent, not a string or not
    /// a known label.
    pub(crate) fn level<L: FromStr>(&mut self, key: &str, baseline: L) -> L {
        match self.fields.get(key).and_then(Value::as_str).map(|s| s.parse::<L>()) {
            Some(Ok(level)) => level,
            _ => {
                self.default_for(key);
                baseline
            }
        }
    }

    pub(crate) fn into_defaulted(self) -> Vec<String> {
        self.defaulted
    }
}
