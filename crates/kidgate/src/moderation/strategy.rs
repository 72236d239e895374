//! Moderation strategy catalog.
//!
//! A strategy is a named instruction fragment a parent picks to shape how a
//! reply is composed. Names are developer-facing and matched exactly: an
//! unknown name is a hard [`GateError::UnknownStrategy`], unlike unknown
//! feature ids, which the whitelist drops silently.

use crate::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Strategy {
    RefuseAndExplain,
    RemoveHarmfulPhrases,
    OmitUnpromptedSuggestions,
    NoWorkarounds,
    ClarifyIntent,
    EmotionalSupport,
    ExplainProblems,
    RiskAwareness,
    RedirectWithAlternatives,
    RemindNotHuman,
    EncourageIntrospection,
    TailorToAge,
    DeferToParents,
    DeferToResources,
}

/// `(strategy, display name, instruction)` in catalog order.
const CATALOG: [(Strategy, &str, &str); 14] = [
    (
        Strategy::RefuseAndExplain,
        "Refuse Response and Explain",
        "Decline to answer and give a simple, child-friendly reason.",
    ),
    (
        Strategy::RemoveHarmfulPhrases,
        "Remove Harmful Phrases",
        "Answer but avoid or replace harmful wording.",
    ),
    (
        Strategy::OmitUnpromptedSuggestions,
        "Omit Unprompted Suggestions",
        "Only answer the direct question; no extra tips.",
    ),
    (
        Strategy::NoWorkarounds,
        "Do Not Suggest Workarounds",
        "Do not offer workarounds or loopholes.",
    ),
    (
        Strategy::ClarifyIntent,
        "Clarify Child's Intent",
        "Ask a gentle clarifying question first.",
    ),
    (
        Strategy::EmotionalSupport,
        "Emphasize Emotional Support",
        "Acknowledge feelings in a warm, friendly tone.",
    ),
    (
        Strategy::ExplainProblems,
        "Explain Problems in Prompt",
        "Gently explain why the idea could be unsafe/problematic.",
    ),
    (
        Strategy::RiskAwareness,
        "Emphasize Risk Awareness",
        "Briefly mention age-appropriate risks.",
    ),
    (
        Strategy::RedirectWithAlternatives,
        "Redirect with Alternatives",
        "Redirect to a safer, positive alternative.",
    ),
    (
        Strategy::RemindNotHuman,
        "Remind Model is Not Human",
        "State clearly you're an AI when relevant.",
    ),
    (
        Strategy::EncourageIntrospection,
        "Encourage Introspection",
        "Prompt the child to self-reflect instead of giving a direct answer.",
    ),
    (
        Strategy::TailorToAge,
        "Tailor to Age Group",
        "Simplify language to be age-appropriate.",
    ),
    (
        Strategy::DeferToParents,
        "Defer to Parents",
        "Defer this topic to a parent/trusted adult.",
    ),
    (
        Strategy::DeferToResources,
        "Defer to Resources",
        "Suggest an appropriate real-world resource.",
    ),
];

impl Strategy {
    /// Every strategy in catalog order.
    pub fn all() -> impl Iterator<Item = Strategy> {
        CATALOG.iter().map(|(s, _, _)| *s)
    }

    fn entry(&self) -> &'static (Strategy, &'static str, &'static str) {
        // The catalog lists every variant exactly once.
        &CATALOG[*self as usize]
    }

    /// Display name, which is also the wire name.
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Generic instruction text.
    pub fn instruction(&self) -> &'static str {
        self.entry().2
    }

    /// Instruction text for a specific child. Only age tailoring changes when
    /// an age description is supplied.
    pub fn instruction_for(&self, child_age: Option<&str>) -> String {
        match (self, child_age.map(str::trim)) {
            (Strategy::TailorToAge, Some(age)) if !age.is_empty() => format!(
                "Tailor language and complexity for a {age} child. \
                 Explain terms and concepts they might not understand."
            ),
            _ => self.instruction().to_string(),
        }
    }

    /// Exact-name lookup.
    pub fn from_name(name: &str) -> Option<Strategy> {
        CATALOG.iter().find(|(_, n, _)| *n == name).map(|(s, _, _)| *s)
    }
}

impl FromStr for Strategy {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::from_name(s).ok_or_else(|| GateError::UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for Strategy {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Strategy> for &'static str {
    fn from(strategy: Strategy) -> Self {
        strategy.name()
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Catalog entry as listed to callers.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub instruction: &'static str,
}

/// The whole catalog in order, for listing endpoints and the CLI.
pub fn catalog() -> Vec<StrategyInfo> {
    CATALOG
        .iter()
        .map(|(_, name, instruction)| StrategyInfo { name, instruction })
        .collect()
}

/// Resolve names to strategies.
///
/// Fails on the first unknown name. Duplicates collapse to their first
/// occurrence; order is otherwise preserved.
pub fn resolve<S: AsRef<str>>(names: &[S]) -> GateResult<Vec<Strategy>> {
    let mut out: Vec<Strategy> = Vec::with_capacity(names.len());
    for name in names {
        let strategy: Strategy = name.as_ref().parse()?;
        if !out.contains(&strategy) {
            out.push(strategy);
        }
    }
    Ok(out)
}
