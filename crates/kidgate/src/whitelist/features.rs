//! Feature catalog: what a parent can whitelist for a child.
//!
//! Each entry pairs the prompt snippet used by
//! [`build_system_prompt`](super::build_system_prompt) with display metadata
//! and the age groups it is offered to. The table is static; adding a
//! feature means adding an entry here.

use super::age::{AgeGroup, group_for_age};
use serde::Serialize;

/// A capability bundled under a feature (shown to parents, not to the model).
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// One whitelistable feature.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feature {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Line appended to the child's system prompt when selected.
    #[serde(skip)]
    pub snippet: &'static str,
    /// Age group ids the feature is available to.
    pub age_groups: &'static [&'static str],
    /// Age group ids the feature is recommended for.
    pub recommended_for: &'static [&'static str],
    pub capabilities: &'static [Capability],
}

pub const FEATURES: &[Feature] = &[Feature {
    id: "school_assignment",
    name: "School Assignment",
    description: "Take a picture and upload assignments, get help with academic questions",
    snippet: "- School assignments and homework: You may help with understanding questions, \
              explaining concepts, and guiding through problems. You may accept photo uploads \
              of assignments. Do not solve problems completely; encourage the child to reason \
              through steps.",
    age_groups: &["9-12", "13-15", "16-18"],
    recommended_for: &["9-12", "13-15", "16-18"],
    capabilities: &[
        Capability {
            id: "photo_upload",
            name: "Photo Upload",
            description: "Take a picture and upload homework or assignments",
        },
        Capability {
            id: "academic_help",
            name: "Academic Questions",
            description: "Get help with school assignments and academic questions",
        },
    ],
}];

/// Look up a feature by id. Unknown ids return `None`.
pub fn feature(id: &str) -> Option<&'static Feature> {
    FEATURES.iter().find(|f| f.id == id)
}

/// Prompt snippet for a feature id, if the id is known.
pub fn snippet(id: &str) -> Option<&'static str> {
    feature(id).map(|f| f.snippet)
}

fn filter_for_age(age: u8, pick: impl Fn(&Feature, &AgeGroup) -> bool) -> Vec<&'static Feature> {
    match group_for_age(age) {
        Some(group) => FEATURES.iter().filter(|f| pick(*f, group)).collect(),
        None => Vec::new(),
    }
}

/// Features recommended for a child of this exact age.
pub fn recommended_features(age: u8) -> Vec<&'static Feature> {
    filter_for_age(age, |f, g| f.recommended_for.contains(&g.id))
}

/// Features available (offered at all) to a child of this exact age.
pub fn available_features(age: u8) -> Vec<&'static Feature> {
    filter_for_age(age, |f, g| f.age_groups.contains(&g.id))
}

/// Result of checking a selection against a child's age.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AgeCheck {
    pub valid: bool,
    /// Selected ids that are not available at this age (including unknown ids).
    pub unavailable: Vec<String>,
}

/// Check which selected ids are not offered at `age`.
///
/// Advisory only: the prompt builder still drops unknown ids silently.
pub fn validate_features_for_age<S: AsRef<str>>(selected: &[S], age: u8) -> AgeCheck {
    let available = available_features(age);
    let unavailable: Vec<String> = selected
        .iter()
        .map(|s| s.as_ref())
        .filter(|id| !available.iter().any(|f| f.id == *id))
        .map(str::to_string)
        .collect();
    AgeCheck {
        valid: unavailable.is_empty(),
        unavailable,
    }
}
