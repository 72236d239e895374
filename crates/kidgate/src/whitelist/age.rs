//! Age groups.
//!
//! Ages are stored as the lower bound of their group (6, 9, 13, 16) and shown
//! as ranges (`"9-12 years"`). Groups follow the cognitive stages the feature
//! catalog is aligned with.

use serde::Serialize;

/// Cognitive development stage of an age group.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveStage {
    Preoperational,
    ConcreteOperational,
    FormalOperational,
}

/// One age bracket.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgeGroup {
    /// Stable id, e.g. `"9-12"`.
    pub id: &'static str,
    /// Display label, e.g. `"9-12 years"`.
    pub label: &'static str,
    pub min: u8,
    pub max: u8,
    pub stage: CognitiveStage,
}

impl AgeGroup {
    /// Value stored for this group (its lower bound).
    pub fn value(&self) -> u8 {
        self.min
    }

    pub fn contains(&self, age: u8) -> bool {
        (self.min..=self.max).contains(&age)
    }
}

pub const AGE_GROUPS: [AgeGroup; 4] = [
    AgeGroup {
        id: "6-8",
        label: "6-8 years",
        min: 6,
        max: 8,
        stage: CognitiveStage::Preoperational,
    },
    AgeGroup {
        id: "9-12",
        label: "9-12 years",
        min: 9,
        max: 12,
        stage: CognitiveStage::ConcreteOperational,
    },
    AgeGroup {
        id: "13-15",
        label: "13-15 years",
        min: 13,
        max: 15,
        stage: CognitiveStage::FormalOperational,
    },
    AgeGroup {
        id: "16-18",
        label: "16-18 years",
        min: 16,
        max: 18,
        stage: CognitiveStage::FormalOperational,
    },
];

/// The group containing an exact age.
pub fn group_for_age(age: u8) -> Option<&'static AgeGroup> {
    AGE_GROUPS.iter().find(|g| g.contains(age))
}

/// The group whose stored value is exactly `value`.
pub fn group_for_value(value: u8) -> Option<&'static AgeGroup> {
    AGE_GROUPS.iter().find(|g| g.value() == value)
}

/// The group whose label matches exactly.
pub fn group_for_label(label: &str) -> Option<&'static AgeGroup> {
    AGE_GROUPS.iter().find(|g| g.label == label)
}

/// Group for free text such as `"9 years old"`: the first run of digits is
/// taken as the age.
pub fn group_from_text(text: &str) -> Option<&'static AgeGroup> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u8>().ok().and_then(group_for_age)
}

/// Text used to describe a child's age to the composer: the group label when
/// the age falls inside a group, otherwise `"<age>-year-old"`.
pub fn describe_age(age: u8) -> String {
    match group_for_age(age) {
        Some(group) => group.label.to_string(),
        None => format!("{age}-year-old"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ages_map_to_groups() {
        assert_eq!(group_for_age(6).unwrap().id, "6-8");
        assert_eq!(group_for_age(12).unwrap().id, "9-12");
        assert_eq!(group_for_age(13).unwrap().id, "13-15");
        assert_eq!(group_for_age(18).unwrap().id, "16-18");
        assert!(group_for_age(5).is_none());
        assert!(group_for_age(19).is_none());
    }

    #[test]
    fn stored_values_and_labels() {
        assert_eq!(group_for_value(9).unwrap().label, "9-12 years");
        assert!(group_for_value(10).is_none());
        assert_eq!(group_for_label("16-18 years").unwrap().value(), 16);
        assert!(group_for_label("teen").is_none());
    }

    #[test]
    fn free_text_parsing() {
        assert_eq!(group_from_text("9 years old").unwrap().id, "9-12");
        assert_eq!(group_from_text("age: 14").unwrap().id, "13-15");
        assert!(group_from_text("a toddler").is_none());
        assert!(group_from_text("300").is_none());
    }

    #[test]
    fn describe_age_prefers_label() {
        assert_eq!(describe_age(7), "6-8 years");
        assert_eq!(describe_age(4), "4-year-old");
    }
}
