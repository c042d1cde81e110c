//! Student records and goal history entries.
//!
//! Historical rows come from a loosely-typed store, so every lenient coercion
//! (tone, achievement score, dates) lives here and runs once at ingestion.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Success-measure value recorded for goals the student set outside the app.
pub const MANUAL_GOAL_MEASURE: &str = "[manual goal]";

/// Outcome reflection recorded alongside a student's very first goal.
pub const FIRST_GOAL_REFLECTION: &str = "[first goal]";

/// Score ranges a student can aim for with a new goal.
pub const GOAL_RANGES: [&str; 3] = ["-2 to +2", "0 to +2", "0 to 1"];

/// Coaching tone the student picked at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    #[default]
    Reflective,
    Coach,
    Challenger,
}

impl Tone {
    /// Parse a stored tone, falling back to `Reflective` for anything unknown.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "coach" => Self::Coach,
            "challenger" => Self::Challenger,
            _ => Self::Reflective,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflective => "Reflective",
            Self::Coach => "Coach",
            Self::Challenger => "Challenger",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub nickname: String,
    pub pronoun_code: String,
    pub tone: Tone,
    pub current_goal: String,
    pub current_success_measures: String,
    pub current_goal_set_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_range: Option<String>,
    pub background_info: String,
}

impl Student {
    /// A freshly registered student with no goal yet.
    pub fn new(student_id: &str, nickname: &str, pronoun_code: &str, tone: Tone) -> Self {
        Self {
            student_id: student_id.trim().to_string(),
            nickname: nickname.trim().to_string(),
            pronoun_code: pronoun_code.trim().to_string(),
            tone,
            current_goal: String::new(),
            current_success_measures: String::new(),
            current_goal_set_date: None,
            goal_range: None,
            background_info: String::new(),
        }
    }

    /// Name to address the student by.
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.student_id
        } else {
            &self.nickname
        }
    }

    /// Whether the current goal was set within `cutoff_days` of `today`.
    ///
    /// A missing set-date is never recent. A set-date in the future counts as
    /// recent (zero or negative days elapsed).
    pub fn goal_is_recent(&self, today: NaiveDate, cutoff_days: i64) -> bool {
        match self.current_goal_set_date {
            Some(set_date) => (today - set_date).num_days() <= cutoff_days,
            None => false,
        }
    }
}

/// How well the student met a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    /// Self-rated score on the 0-4 scale.
    Score(u8),
    /// The entry records the student's first goal; nothing to rate yet.
    NoPriorGoal,
    /// Legacy or free-text value that is not a 0-4 score.
    Unrated(String),
}

impl Achievement {
    const NO_PRIOR_GOAL: &'static str = "first goal";

    /// Parse a stored achievement value. Never fails.
    pub fn parse_lenient(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::NO_PRIOR_GOAL) {
            return Self::NoPriorGoal;
        }
        match trimmed.parse::<u8>() {
            Ok(score) if score <= 4 => Self::Score(score),
            _ => Self::Unrated(trimmed.to_string()),
        }
    }

    /// The stored text form.
    pub fn to_stored(&self) -> String {
        match self {
            Self::Score(score) => score.to_string(),
            Self::NoPriorGoal => Self::NO_PRIOR_GOAL.to_string(),
            Self::Unrated(raw) => raw.clone(),
        }
    }

    pub fn score(&self) -> Option<u8> {
        match self {
            Self::Score(score) => Some(*score),
            _ => None,
        }
    }

    /// Whether this is a numeric score contained in `scores`.
    pub fn is_one_of(&self, scores: &[u8]) -> bool {
        self.score().is_some_and(|s| scores.contains(&s))
    }
}

/// Fixed interpretation label for a 0-4 score.
pub fn interpretation_for(score: u8) -> Option<&'static str> {
    match score {
        4 => Some("Met and exceeded"),
        3 => Some("Met goal"),
        2 => Some("Almost met"),
        1 => Some("Tried but didn't succeed"),
        0 => Some("Didn't attempt"),
        _ => None,
    }
}

/// Interpretation recorded for the entry that marks a first goal.
pub const INITIAL_GOAL_INTERPRETATION: &str = "Initial goal set";

/// One reflection event. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalHistoryEntry {
    pub student_id: String,
    pub goal_text: String,
    pub goal_set_date: Option<NaiveDate>,
    pub success_measure: String,
    pub outcome_reflection: String,
    pub achievement: Achievement,
    pub interpretation: String,
    pub background_info: String,
}

/// Where the goal under reflection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The student's stored current goal.
    App,
    /// A goal the student set on paper.
    Manual,
    /// A seeded demo student's stored goal.
    Demo,
    /// First visit; there is no goal yet.
    Onboard,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::App => "app",
            Self::Manual => "manual",
            Self::Demo => "demo",
            Self::Onboard => "onboard",
        };
        f.write_str(s)
    }
}

/// The goal being reflected on in the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalToReflect {
    pub text: String,
    pub set_date: Option<NaiveDate>,
    pub provenance: Provenance,
}

/// Parse a stored date; empty or malformed values become `None`.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn achievement_parses_scores() {
        assert_eq!(Achievement::parse_lenient("4"), Achievement::Score(4));
        assert_eq!(Achievement::parse_lenient(" 0 "), Achievement::Score(0));
    }

    #[test]
    fn achievement_tolerates_legacy_values() {
        assert_eq!(Achievement::parse_lenient("first goal"), Achievement::NoPriorGoal);
        assert_eq!(Achievement::parse_lenient("First Goal"), Achievement::NoPriorGoal);
        assert_eq!(
            Achievement::parse_lenient("+2 (Far exceeded)"),
            Achievement::Unrated("+2 (Far exceeded)".to_string())
        );
        assert_eq!(Achievement::parse_lenient("-1"), Achievement::Unrated("-1".to_string()));
        assert_eq!(Achievement::parse_lenient("7"), Achievement::Unrated("7".to_string()));
        assert_eq!(Achievement::parse_lenient(""), Achievement::Unrated(String::new()));
    }

    #[test]
    fn achievement_membership_ignores_non_scores() {
        assert!(Achievement::Score(1).is_one_of(&[0, 1]));
        assert!(!Achievement::Score(2).is_one_of(&[0, 1]));
        assert!(!Achievement::NoPriorGoal.is_one_of(&[0, 1, 2, 3, 4]));
        assert!(!Achievement::Unrated("0".into()).is_one_of(&[0]));
    }

    #[test]
    fn achievement_stored_form() {
        assert_eq!(Achievement::Score(3).to_stored(), "3");
        assert_eq!(Achievement::NoPriorGoal.to_stored(), "first goal");
        assert_eq!(
            Achievement::parse_lenient(&Achievement::NoPriorGoal.to_stored()),
            Achievement::NoPriorGoal
        );
    }

    #[test]
    fn interpretation_labels() {
        assert_eq!(interpretation_for(4), Some("Met and exceeded"));
        assert_eq!(interpretation_for(3), Some("Met goal"));
        assert_eq!(interpretation_for(2), Some("Almost met"));
        assert_eq!(interpretation_for(1), Some("Tried but didn't succeed"));
        assert_eq!(interpretation_for(0), Some("Didn't attempt"));
        assert_eq!(interpretation_for(5), None);
    }

    #[test]
    fn tone_is_lenient() {
        assert_eq!(Tone::parse_lenient("Coach"), Tone::Coach);
        assert_eq!(Tone::parse_lenient("CHALLENGER"), Tone::Challenger);
        assert_eq!(Tone::parse_lenient(""), Tone::Reflective);
        assert_eq!(Tone::parse_lenient("grumpy"), Tone::Reflective);
    }

    #[test]
    fn recency_boundary() {
        let today = date("2026-03-10");
        let mut student = Student::new("1", "Sam", "they/them", Tone::Coach);

        student.current_goal_set_date = Some(date("2026-03-06"));
        assert!(student.goal_is_recent(today, 4), "exactly cutoff days is recent");

        student.current_goal_set_date = Some(date("2026-03-05"));
        assert!(!student.goal_is_recent(today, 4), "cutoff + 1 is not recent");

        student.current_goal_set_date = None;
        assert!(!student.goal_is_recent(today, 4), "missing date is not recent");
    }

    #[test]
    fn dates_parse_leniently() {
        assert_eq!(parse_date_lenient("2026-01-05"), Some(date("2026-01-05")));
        assert_eq!(parse_date_lenient("01/05/2026"), Some(date("2026-01-05")));
        assert_eq!(parse_date_lenient(""), None);
        assert_eq!(parse_date_lenient("yesterday"), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let student = Student::new("42", "", "", Tone::Reflective);
        assert_eq!(student.display_name(), "42");
        let student = Student::new("42", "Rae", "", Tone::Reflective);
        assert_eq!(student.display_name(), "Rae");
    }
}
