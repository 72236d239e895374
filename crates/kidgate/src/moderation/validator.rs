//! Post-generation validation of a composed reply.
//!
//! The validator only recommends (`should_block`); it never withholds
//! anything itself.

use super::judge::{self, JudgeCall, Stage};
use super::verdict::ValidationVerdict;
use crate::api::ChatBackend;
use crate::prompt::PromptBuilder;
use crate::{DEFAULT_MODEL, GateResult, JUDGE_TEMPERATURE};
use serde::{Deserialize, Serialize};
use tracing::info;

const VALIDATOR_ROLE: &str =
    "You are an AI response validator that checks compliance with safety whitelists.";

const VALIDATOR_PREAMBLE: &str = "You are an AI response validator. Your job is to check if an \
AI-generated response complies with the whitelist safety rules.";

const VALIDATOR_CRITERIA: [&str; 5] = [
    "Follows all safety guidelines in the system prompt",
    "Contains age-appropriate content only",
    "Doesn't provide harmful, dangerous, or inappropriate information",
    "Doesn't bypass or undermine the intended safety restrictions",
    "Maintains child-safe language and concepts",
];

const VALIDATOR_SHAPE: &str = r#"Respond in JSON format:
{
  "is_compliant": true/false,
  "severity": "none" | "low" | "medium" | "high" | "critical",
  "violations": ["list of specific violations"],
  "reasoning": "brief explanation of your validation",
  "should_block": true/false
}"#;

const VALIDATOR_POLICY: &str = "Set should_block to true for medium severity or higher \
violations that pose actual safety risks.";

/// A reply to validate and the rules to validate it against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    pub response_text: String,
    pub whitelist_system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_child_prompt: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl ValidationRequest {
    pub fn new(response_text: impl Into<String>, whitelist_system_prompt: impl Into<String>) -> Self {
        Self {
            response_text: response_text.into(),
            whitelist_system_prompt: whitelist_system_prompt.into(),
            original_child_prompt: None,
            model: default_model(),
        }
    }

    pub fn with_child_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.original_child_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Instruction text sent to the validation judge.
pub fn validation_prompt(request: &ValidationRequest) -> String {
    let context = request
        .original_child_prompt
        .as_deref()
        .filter(|p| !p.is_empty());
    PromptBuilder::new(VALIDATOR_PREAMBLE)
        .labeled(
            "WHITELIST SYSTEM PROMPT (Safety Rules)",
            request.whitelist_system_prompt.as_str(),
        )
        .labeled_opt("ORIGINAL CHILD'S PROMPT (for context)", context)
        .labeled("AI-GENERATED RESPONSE TO VALIDATE", request.response_text.as_str())
        .numbered("Check whether the response:", VALIDATOR_CRITERIA)
        .raw(VALIDATOR_SHAPE)
        .raw(VALIDATOR_POLICY)
        .build()
}

/// Validate a composed reply against the whitelist prompt.
///
/// One judge call at [`JUDGE_TEMPERATURE`]; same fence stripping and field
/// defaulting as the screener.
pub async fn validate(
    backend: &dyn ChatBackend,
    request: &ValidationRequest,
) -> GateResult<ValidationVerdict> {
    validate_at(backend, request, JUDGE_TEMPERATURE).await
}

/// [`validate`] with an explicit judge temperature.
pub async fn validate_at(
    backend: &dyn ChatBackend,
    request: &ValidationRequest,
    temperature: f32,
) -> GateResult<ValidationVerdict> {
    let call = JudgeCall::new(
        Stage::Validation,
        request.model.as_str(),
        VALIDATOR_ROLE,
        validation_prompt(request),
    )
    .with_temperature(temperature);

    let reply = judge::run(backend, &call).await?;
    let verdict = ValidationVerdict::from_fields(reply.fields, reply.model);
    judge::report_degraded(Stage::Validation, &verdict.defaulted_fields);

    info!(
        compliant = verdict.is_compliant,
        severity = %verdict.severity,
        should_block = verdict.should_block,
        "Reply validated"
    );
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedBackend;
    use crate::moderation::verdict::Severity;
    use serde_json::json;

    #[test]
    fn prompt_without_context() {
        let req = ValidationRequest::new("Fractions are parts of a whole.", "RULES");
        let prompt = validation_prompt(&req);
        assert!(prompt.contains("WHITELIST SYSTEM PROMPT (Safety Rules):\nRULES"));
        assert!(!prompt.contains("ORIGINAL CHILD'S PROMPT"));
        assert!(prompt.contains("AI-GENERATED RESPONSE TO VALIDATE:\nFractions are parts of a whole."));
        assert!(prompt.contains("5. Maintains child-safe language and concepts"));
        assert!(prompt.ends_with(VALIDATOR_POLICY));
    }

    #[test]
    fn prompt_with_context_between_rules_and_reply() {
        let req = ValidationRequest::new("reply", "RULES").with_child_prompt("what is 1/2?");
        let prompt = validation_prompt(&req);
        let rules = prompt.find("RULES").unwrap();
        let context = prompt
            .find("ORIGINAL CHILD'S PROMPT (for context):\nwhat is 1/2?")
            .unwrap();
        let reply = prompt.find("AI-GENERATED RESPONSE").unwrap();
        assert!(rules < context && context < reply);
    }

    #[tokio::test]
    async fn blocking_recommendation_passes_through() {
        let backend = ScriptedBackend::new().with_json(json!({
            "is_compliant": false,
            "severity": "high",
            "violations": ["explains lock picking"],
            "reasoning": "harmful detail",
            "should_block": true
        }));
        let req = ValidationRequest::new("First insert a tension wrench...", "RULES")
            .with_model("judge");
        let verdict = validate(&backend, &req).await.unwrap();
        assert!(verdict.should_block);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.violations, vec!["explains lock picking"]);
        assert!(!verdict.is_degraded());

        let sent = &backend.requests()[0];
        assert_eq!(sent.model, "judge");
        assert_eq!(sent.temperature, Some(JUDGE_TEMPERATURE));
        assert_eq!(sent.messages[0].content, VALIDATOR_ROLE);
    }

    #[tokio::test]
    async fn missing_violations_defaults() {
        let backend = ScriptedBackend::new()
            .with_reply("```\n{\"severity\": \"none\", \"reasoning\": \"ok\", \"should_block\": false}\n```");
        let verdict = validate(&backend, &ValidationRequest::new("hi", "RULES"))
            .await
            .unwrap();
        assert!(verdict.violations.is_empty());
        assert!(verdict.is_compliant);
        assert!(verdict.is_degraded());
    }

    #[test]
    fn request_deserializes_with_default_model() {
        let req: ValidationRequest = serde_json::from_value(json!({
            "response_text": "r",
            "whitelist_system_prompt": "s"
        }))
        .unwrap();
        assert_eq!(req.model, DEFAULT_MODEL);
        assert!(req.original_child_prompt.is_none());
    }
}
