//! Follow-up prompt suggestion.
//!
//! Given a child's first prompt and the reply they got, ask the generator
//! for one realistic next question. Used to preview how a conversation is
//! likely to continue under the current strategies.

use super::judge::{self, JudgeCall, Stage};
use crate::GateResult;
use crate::api::ChatBackend;
use serde_json::{Value, json};

const FOLLOWUP_SYSTEM: &str = "You are a child-friendly assistant.\n\
Task: Create ONE realistic follow-up prompt a child might ask, based on their initial prompt and your previous response.\n\
Output as JSON only:\n\
{\"child_followup_prompt\": string}";

/// Suggest one follow-up prompt. A reply without the field yields an empty
/// string.
pub async fn suggest_followup(
    backend: &dyn ChatBackend,
    initial_prompt: &str,
    initial_response: &str,
    model: &str,
) -> GateResult<String> {
    let user = json!({
        "initial_child_prompt": initial_prompt,
        "assistant_initial_response": initial_response,
    });
    let call = JudgeCall::new(Stage::Followup, model, FOLLOWUP_SYSTEM, user.to_string());
    let reply = judge::run(backend, &call).await?;

    let suggestion = reply
        .fields
        .get("child_followup_prompt")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if suggestion.is_empty() {
        judge::report_degraded(Stage::Followup, &["child_followup_prompt".to_string()]);
    }
    Ok(suggestion)
}
