//! Strategy-driven reply composition.
//!
//! One pipeline serves both modes: [`ComposeMode::Generate`] when there is no
//! prior reply, [`ComposeMode::Refactor`] when the caller supplies one. The
//! modes differ only in the framing lines of the system text and in whether
//! the prior reply is sent along.

use super::judge::{self, JudgeCall, Stage};
use super::strategy::{self, Strategy};
use crate::api::ChatBackend;
use crate::prompt::numbered_list;
use crate::{DEFAULT_MAX_CHARS, DEFAULT_MODEL, DEFERRAL_REPLY, GateResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Instruction sent when no strategy and no custom instruction was selected.
pub const SAFE_DEFAULT_INSTRUCTION: &str = "Provide a safe, age-appropriate answer.";

/// Rule used when the generator returns none.
pub const FALLBACK_RULE: &str =
    "Prioritize child safety; avoid unsafe details; defer to a parent for sensitive topics.";

/// Longest custom-instruction excerpt kept in result labels.
const LABEL_EXCERPT_CHARS: usize = 50;

/// Everything the composer needs for one reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ComposeRequest {
    pub child_prompt: String,
    /// Strategy names, in the order the parent selected them.
    pub strategies: Vec<String>,
    pub custom_instructions: Vec<String>,
    /// A prior reply to rewrite. Absent or blank means generation mode.
    pub original_response: Option<String>,
    /// Phrases the parent flagged. Carried into the result for display.
    pub highlighted_texts: Vec<String>,
    pub model: String,
    /// Advisory budget for reply plus rule, stated to the model.
    pub max_chars: usize,
    /// Free-text age description, e.g. `"9-12 years"`.
    pub child_age: Option<String>,
}

impl Default for ComposeRequest {
    fn default() -> Self {
        Self {
            child_prompt: String::new(),
            strategies: Vec::new(),
            custom_instructions: Vec::new(),
            original_response: None,
            highlighted_texts: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            max_chars: DEFAULT_MAX_CHARS,
            child_age: None,
        }
    }
}

impl ComposeRequest {
    pub fn new(child_prompt: impl Into<String>) -> Self {
        Self {
            child_prompt: child_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_strategies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_custom_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.custom_instructions.push(instruction.into());
        self
    }

    pub fn with_custom_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    /// Switch to refactor mode on the given prior reply.
    pub fn refactoring(mut self, original_response: impl Into<String>) -> Self {
        self.original_response = Some(original_response.into());
        self
    }

    pub fn with_highlights<I, S>(mut self, highlights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.highlighted_texts = highlights.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_child_age(mut self, age: impl Into<String>) -> Self {
        self.child_age = Some(age.into());
        self
    }

    pub fn mode(&self) -> ComposeMode {
        match self.prior_reply() {
            Some(_) => ComposeMode::Refactor,
            None => ComposeMode::Generate,
        }
    }

    fn prior_reply(&self) -> Option<&str> {
        self.original_response
            .as_deref()
            .filter(|r| !r.trim().is_empty())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComposeMode {
    Generate,
    Refactor,
}

/// The composer's output bundle. Not persisted by this crate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModerationResult {
    pub model: String,
    pub child_prompt: String,
    pub original_response: Option<String>,
    pub highlighted_texts: Vec<String>,
    /// Standard strategy names followed by `Custom #n: ...` labels.
    pub applied_strategies: Vec<String>,
    pub refactored_response: String,
    pub system_prompt_rule: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<String>,
}

/// The numbered instruction lines sent to the generator.
///
/// Strategy texts first (age tailoring parameterized by `child_age`), then
/// custom instructions with continued numbering. Never empty.
pub fn instruction_lines(
    strategies: &[Strategy],
    custom_instructions: &[String],
    child_age: Option<&str>,
) -> Vec<String> {
    let lines: Vec<String> = strategies
        .iter()
        .map(|s| s.instruction_for(child_age))
        .chain(custom_lines(custom_instructions).map(str::to_string))
        .collect();
    if lines.is_empty() {
        vec![SAFE_DEFAULT_INSTRUCTION.to_string()]
    } else {
        lines
    }
}

/// System text for the generator in the given mode.
pub fn system_text(mode: ComposeMode, instructions: &[String], max_chars: usize) -> String {
    let (framing, tone) = match mode {
        ComposeMode::Generate => (
            "Follow ALL of the following instructions together:",
            "warm, age-appropriate, concise",
        ),
        ComposeMode::Refactor => (
            "You will be given a child's original prompt and the assistant's original response.\n\
             Your job is to rewrite the response to follow ALL of the following parent-selected rules:",
            "warm, child-friendly, concise",
        ),
    };
    let joined = match instructions {
        [only] if only == SAFE_DEFAULT_INSTRUCTION => only.clone(),
        _ => numbered_list(instructions),
    };
    format!(
        "You are a child-friendly AI assisting with parent-guided moderation.\n\
         {framing}\n\
         {joined}\n\n\
         Output STRICTLY as JSON (no extra text):\n\
         {{ \"refactored_response\": string, \"system_prompt_rule\": string }}\n\
         Constraints: {tone}; combined length ≤ {max_chars} chars."
    )
}

/// Custom instructions as sent: trimmed, blanks dropped.
fn custom_lines(custom_instructions: &[String]) -> impl Iterator<Item = &str> {
    custom_instructions
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

/// Display labels: strategy names then `Custom #n: <first 50 chars>...`.
///
/// Custom numbering follows the instruction lines, so blank entries are skipped.
pub fn applied_labels(strategies: &[Strategy], custom_instructions: &[String]) -> Vec<String> {
    let custom = custom_lines(custom_instructions).enumerate().map(|(i, text)| {
        let n = i + 1;
        if text.chars().count() > LABEL_EXCERPT_CHARS {
            let excerpt: String = text.chars().take(LABEL_EXCERPT_CHARS).collect();
            format!("Custom #{n}: {excerpt}...")
        } else {
            format!("Custom #{n}: {text}")
        }
    });
    strategies
        .iter()
        .map(|s| s.name().to_string())
        .chain(custom)
        .collect()
}

fn nonblank_field(fields: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Compose a reply under the requested strategies.
///
/// Strategy names are resolved before anything is sent, so an unknown name
/// fails with [`GateError::UnknownStrategy`](crate::GateError::UnknownStrategy)
/// and no call is made. The character budget is stated to the model and not
/// enforced locally. A blank or missing reply or rule is replaced by
/// [`DEFERRAL_REPLY`] / [`FALLBACK_RULE`].
pub async fn compose(
    backend: &dyn ChatBackend,
    request: &ComposeRequest,
) -> GateResult<ModerationResult> {
    let strategies = strategy::resolve(&request.strategies)?;
    let mode = request.mode();
    let instructions = instruction_lines(
        &strategies,
        &request.custom_instructions,
        request.child_age.as_deref(),
    );

    let user = match request.prior_reply() {
        Some(prior) => json!({
            "child_prompt": request.child_prompt,
            "original_response": prior,
        }),
        None => json!({ "child_prompt": request.child_prompt }),
    };

    let call = JudgeCall::new(
        Stage::Composition,
        request.model.as_str(),
        system_text(mode, &instructions, request.max_chars),
        user.to_string(),
    );
    let reply = judge::run(backend, &call).await?;

    let mut defaulted = Vec::new();
    let refactored_response = nonblank_field(&reply.fields, "refactored_response")
        .unwrap_or_else(|| {
            defaulted.push("refactored_response".to_string());
            DEFERRAL_REPLY.to_string()
        });
    let system_prompt_rule = nonblank_field(&reply.fields, "system_prompt_rule")
        .unwrap_or_else(|| {
            defaulted.push("system_prompt_rule".to_string());
            FALLBACK_RULE.to_string()
        });
    judge::report_degraded(Stage::Composition, &defaulted);

    let combined = refactored_response.chars().count() + system_prompt_rule.chars().count();
    if combined > request.max_chars {
        warn!(
            combined,
            max_chars = request.max_chars,
            "Composed reply exceeds the advisory budget"
        );
    }

    info!(
        mode = ?mode,
        strategies = strategies.len(),
        custom = request.custom_instructions.len(),
        "Reply composed"
    );

    Ok(ModerationResult {
        model: request.model.clone(),
        child_prompt: request.child_prompt.clone(),
        original_response: request.original_response.clone(),
        highlighted_texts: request.highlighted_texts.clone(),
        applied_strategies: applied_labels(&strategies, &request.custom_instructions),
        refactored_response,
        system_prompt_rule,
        defaulted_fields: defaulted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GateError;
    use crate::api::ScriptedBackend;

    fn ok_reply() -> Value {
        json!({
            "refactored_response": "Let's work through it together!",
            "system_prompt_rule": "Guide, don't solve."
        })
    }

    #[test]
    fn instructions_dedup_then_custom_numbering() {
        let strategies =
            strategy::resolve(&["Defer to Parents", "Defer to Parents", "Redirect with Alternatives"])
                .unwrap();
        let lines = instruction_lines(&strategies, &["Mention the library".into()], None);
        assert_eq!(
            numbered_list(&lines),
            "1. Defer this topic to a parent/trusted adult.\n\
             2. Redirect to a safer, positive alternative.\n\
             3. Mention the library"
        );
    }

    #[test]
    fn empty_selection_uses_safe_default() {
        let lines = instruction_lines(&[], &[], None);
        assert_eq!(lines, vec![SAFE_DEFAULT_INSTRUCTION]);
        let text = system_text(ComposeMode::Generate, &lines, 600);
        assert!(text.contains(&format!("together:\n{SAFE_DEFAULT_INSTRUCTION}\n")));
        assert!(!text.contains("1. "));
    }

    #[test]
    fn blank_custom_instructions_ignored() {
        let lines = instruction_lines(&[], &["   ".into()], None);
        assert_eq!(lines, vec![SAFE_DEFAULT_INSTRUCTION]);
    }

    #[test]
    fn system_text_modes() {
        let lines = vec!["Be brief.".to_string()];
        let generate = system_text(ComposeMode::Generate, &lines, 600);
        assert!(generate.contains("Follow ALL of the following instructions together:\n1. Be brief."));
        assert!(generate.contains("combined length ≤ 600 chars."));
        assert!(generate.contains(r#"{ "refactored_response": string, "system_prompt_rule": string }"#));

        let refactor = system_text(ComposeMode::Refactor, &lines, 300);
        assert!(refactor.contains("rewrite the response"));
        assert!(refactor.contains("warm, child-friendly, concise; combined length ≤ 300 chars."));
    }

    #[test]
    fn labels_truncate_long_custom_instructions() {
        let long = "x".repeat(60);
        let labels = applied_labels(
            &[Strategy::TailorToAge],
            &["short one".into(), long.clone()],
        );
        assert_eq!(labels[0], "Tailor to Age Group");
        assert_eq!(labels[1], "Custom #1: short one");
        assert_eq!(labels[2], format!("Custom #2: {}...", "x".repeat(50)));
    }

    #[test]
    fn labels_skip_blank_custom_instructions_like_the_prompt() {
        let customs = vec!["  use kind words ".to_string(), "   ".into(), "keep it short".into()];
        let labels = applied_labels(&[], &customs);
        assert_eq!(
            labels,
            vec!["Custom #1: use kind words", "Custom #2: keep it short"]
        );

        let lines = instruction_lines(&[], &customs, None);
        assert_eq!(lines, vec!["use kind words", "keep it short"]);
    }

    #[test]
    fn labels_count_chars_not_bytes() {
        let text = "é".repeat(50);
        let labels = applied_labels(&[], &[text.clone()]);
        assert_eq!(labels[0], format!("Custom #1: {text}"));
    }

    #[test]
    fn mode_selection() {
        assert_eq!(ComposeRequest::new("q").mode(), ComposeMode::Generate);
        assert_eq!(ComposeRequest::new("q").refactoring("  ").mode(), ComposeMode::Generate);
        assert_eq!(ComposeRequest::new("q").refactoring("old").mode(), ComposeMode::Refactor);
    }

    #[tokio::test]
    async fn generation_sends_only_child_prompt() {
        let backend = ScriptedBackend::new().with_json(ok_reply());
        let request = ComposeRequest::new("what is 3/4?")
            .with_strategies(["Tailor to Age Group", "Encourage Introspection"])
            .with_child_age("9-12 years")
            .with_model("gen");
        let result = compose(&backend, &request).await.unwrap();

        assert_eq!(result.refactored_response, "Let's work through it together!");
        assert_eq!(result.system_prompt_rule, "Guide, don't solve.");
        assert_eq!(
            result.applied_strategies,
            vec!["Tailor to Age Group", "Encourage Introspection"]
        );
        assert!(result.defaulted_fields.is_empty());

        let sent = &backend.requests()[0];
        assert_eq!(sent.model, "gen");
        assert!(sent.temperature.is_none());
        assert!(sent.messages[0]
            .content
            .contains("1. Tailor language and complexity for a 9-12 years child."));
        let user: Value = serde_json::from_str(&sent.messages[1].content).unwrap();
        assert_eq!(user, json!({"child_prompt": "what is 3/4?"}));
    }

    #[tokio::test]
    async fn refactor_sends_prior_reply_and_echoes_highlights() {
        let backend = ScriptedBackend::new().with_json(ok_reply());
        let request = ComposeRequest::new("how do I make slime?")
            .refactoring("Mix borax and glue...")
            .with_highlights(["borax"])
            .with_strategies(["Emphasize Risk Awareness"]);
        let result = compose(&backend, &request).await.unwrap();

        assert_eq!(result.highlighted_texts, vec!["borax"]);
        assert_eq!(result.original_response.as_deref(), Some("Mix borax and glue..."));

        let sent = &backend.requests()[0];
        assert!(sent.messages[0].content.contains("rewrite the response"));
        let user: Value = serde_json::from_str(&sent.messages[1].content).unwrap();
        assert_eq!(user["original_response"], "Mix borax and glue...");
    }

    #[tokio::test]
    async fn duplicate_strategies_yield_two_instructions() {
        let backend = ScriptedBackend::new().with_json(ok_reply());
        let request = ComposeRequest::new("q").with_strategies([
            "Defer to Parents",
            "Defer to Parents",
            "Defer to Resources",
        ]);
        compose(&backend, &request).await.unwrap();
        let system = &backend.requests()[0].messages[0].content;
        assert!(system.contains("1. Defer this topic"));
        assert!(system.contains("2. Suggest an appropriate real-world resource."));
        assert!(!system.contains("3. "));
    }

    #[tokio::test]
    async fn unknown_strategy_makes_no_call() {
        let backend = ScriptedBackend::new().with_json(ok_reply());
        let request = ComposeRequest::new("q").with_strategies(["Not A Real Strategy"]);
        let err = compose(&backend, &request).await.unwrap_err();
        assert!(matches!(err, GateError::UnknownStrategy(ref s) if s == "Not A Real Strategy"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn blank_fields_fall_back() {
        let backend = ScriptedBackend::new()
            .with_reply("```json\n{\"refactored_response\": \"  \"}\n```");
        let result = compose(&backend, &ComposeRequest::new("q")).await.unwrap();
        assert_eq!(result.refactored_response, DEFERRAL_REPLY);
        assert_eq!(result.system_prompt_rule, FALLBACK_RULE);
        assert_eq!(
            result.defaulted_fields,
            vec!["refactored_response", "system_prompt_rule"]
        );
    }

    #[tokio::test]
    async fn long_output_is_not_truncated() {
        let long = "a".repeat(900);
        let backend = ScriptedBackend::new().with_json(json!({
            "refactored_response": long,
            "system_prompt_rule": "r"
        }));
        let result = compose(&backend, &ComposeRequest::new("q")).await.unwrap();
        assert_eq!(result.refactored_response.len(), 900);
    }
}
