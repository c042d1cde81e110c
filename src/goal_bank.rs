//! Goal bank: the fixed goals, warm-up prompts, coaching templates and
//! classifier thresholds. Loaded once from TOML and read-only afterwards.

use std::collections::HashMap;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reflection::classifier::{MotivationCase, Thresholds};

/// The goal bank shipped with the binary.
pub const DEFAULT_GOAL_BANK: &str = include_str!("../config/goal_bank.toml");

/// Named thresholds as they appear in the TOML file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankThresholds {
    pub days_since_goal_cutoff: i64,
    pub low_follow_threshold: usize,
    pub repeat_goal_count: usize,
    pub vague_reflection_length: usize,
    pub strong_streak_threshold: usize,
}

impl Default for BankThresholds {
    fn default() -> Self {
        let classifier = Thresholds::default();
        Self {
            days_since_goal_cutoff: 4,
            low_follow_threshold: classifier.low_follow,
            repeat_goal_count: classifier.repeat_goal,
            vague_reflection_length: classifier.vague_length,
            strong_streak_threshold: classifier.strong_streak,
        }
    }
}

/// Static reference data for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalBank {
    pub goals: Vec<String>,
    #[serde(default)]
    pub mood_words: Vec<String>,
    #[serde(default)]
    pub warmup_prompts: HashMap<String, Vec<String>>,
    /// Coaching templates keyed by motivation case, plus `default`.
    #[serde(default)]
    pub prompts: HashMap<String, String>,
    #[serde(default)]
    pub thresholds: BankThresholds,
}

impl GoalBank {
    /// Parse a goal bank from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let bank: GoalBank =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        if bank.goals.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "goals".to_string(),
                message: "goal bank must list at least one goal".to_string(),
            });
        }
        Ok(bank)
    }

    /// Load a goal bank file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let bank = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), goals = bank.goals.len(), "Goal bank loaded");
        Ok(bank)
    }

    /// The embedded default goal bank.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_GOAL_BANK)
    }

    pub fn goal_texts(&self) -> &[String] {
        &self.goals
    }

    pub fn contains_goal(&self, goal: &str) -> bool {
        self.goals.iter().any(|g| g == goal.trim())
    }

    /// A random warm-up prompt from `category`, if that category has any.
    pub fn random_warmup(&self, category: &str) -> Option<&str> {
        self.warmup_prompts
            .get(category)
            .and_then(|prompts| prompts.choose(&mut rand::thread_rng()))
            .map(String::as_str)
    }

    /// Coaching template for a case, falling back to the `default` template.
    /// `None` selects the default template directly.
    pub fn prompt_for(&self, case: Option<MotivationCase>) -> &str {
        case.and_then(|c| self.prompts.get(c.key()))
            .or_else(|| self.prompts.get("default"))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// Classifier thresholds from the bank.
    pub fn classifier_thresholds(&self) -> Thresholds {
        Thresholds {
            low_follow: self.thresholds.low_follow_threshold,
            repeat_goal: self.thresholds.repeat_goal_count,
            vague_length: self.thresholds.vague_reflection_length,
            strong_streak: self.thresholds.strong_streak_threshold,
        }
    }

    pub fn days_since_goal_cutoff(&self) -> i64 {
        self.thresholds.days_since_goal_cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bank_parses() {
        let bank = GoalBank::builtin().unwrap();
        assert_eq!(bank.goals.len(), 9);
        assert!(bank.goals[0].starts_with("Goal 1:"));
        assert_eq!(bank.days_since_goal_cutoff(), 4);
        assert_eq!(bank.classifier_thresholds(), Thresholds::default());
        assert!(!bank.mood_words.is_empty());
    }

    #[test]
    fn builtin_bank_has_template_for_every_case() {
        let bank = GoalBank::builtin().unwrap();
        for case in [
            MotivationCase::Onboarding,
            MotivationCase::LowFollow,
            MotivationCase::RepeatGoal,
            MotivationCase::UnclearReflection,
            MotivationCase::StrongStreak,
        ] {
            assert!(bank.prompts.contains_key(case.key()), "missing template for {case}");
        }
        assert!(bank.prompt_for(None).contains("what went well"));
    }

    #[test]
    fn prompt_falls_back_to_default() {
        let bank = GoalBank::from_toml(
            r#"
            goals = ["Goal 1: speak up"]
            [prompts]
            default = "generic"
            "#,
        )
        .unwrap();
        assert_eq!(bank.prompt_for(Some(MotivationCase::LowFollow)), "generic");
        assert_eq!(bank.thresholds, BankThresholds::default());
    }

    #[test]
    fn warmup_from_known_category() {
        let bank = GoalBank::builtin().unwrap();
        let prompt = bank.random_warmup("emotional").unwrap();
        assert!(bank.warmup_prompts["emotional"].iter().any(|p| p == prompt));
        assert!(bank.random_warmup("nonexistent").is_none());
    }

    #[test]
    fn goal_membership_trims() {
        let bank = GoalBank::builtin().unwrap();
        let goal = format!("  {}  ", bank.goals[2]);
        assert!(bank.contains_goal(&goal));
        assert!(!bank.contains_goal("Goal 99: juggle"));
    }

    #[test]
    fn empty_goal_list_rejected() {
        let err = GoalBank::from_toml("goals = []").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = GoalBank::from_toml("goals = [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        std::fs::write(&path, "goals = [\"Goal A\"]\n[thresholds]\ndays_since_goal_cutoff = 7\nlow_follow_threshold = 1\nrepeat_goal_count = 2\nvague_reflection_length = 10\nstrong_streak_threshold = 2\n").unwrap();
        let bank = GoalBank::load(&path).unwrap();
        assert_eq!(bank.goal_texts(), &["Goal A".to_string()]);
        assert_eq!(bank.days_since_goal_cutoff(), 7);
        assert_eq!(bank.classifier_thresholds().low_follow, 1);
    }
}
