//! JSON extraction from model replies.
//!
//! Judges and generators are told to answer with bare JSON but often wrap it
//! in a markdown code fence anyway. [`strip_fences`] removes one leading
//! ```` ``` ```` / ```` ```json ```` marker and one trailing ```` ``` ````;
//! [`parse_object`] then insists on a JSON object.

use crate::{GateError, GateResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^```(?:json)?\s*|\s*```$").expect("fence pattern is valid")
});

/// Remove surrounding markdown code fences from a model reply.
pub fn strip_fences(raw: &str) -> String {
    FENCE.replace_all(raw.trim(), "").into_owned()
}

/// Fence-strip a reply and parse it as a JSON object.
///
/// Anything that is not a JSON object after stripping is an upstream error;
/// an object with missing fields is not (callers fill defaults).
pub fn parse_object(raw: &str) -> GateResult<Map<String, Value>> {
    let stripped = strip_fences(raw);
    let value: Value = serde_json::from_str(&stripped).map_err(|e| {
        GateError::upstream(format!(
            "model reply is not valid JSON ({e}); {} chars received",
            raw.len()
        ))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(GateError::upstream(format!(
            "model reply is JSON but not an object (got {})",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
