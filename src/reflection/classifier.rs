//! Motivation-case classifier over a student's recent reflections.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::GoalHistoryEntry;

/// How many trailing history entries the classifier looks at.
const WINDOW: usize = 3;

/// Coaching strategy selected for the motivational conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivationCase {
    /// First visit. Produced by the router, never by `classify`.
    Onboarding,
    LowFollow,
    RepeatGoal,
    UnclearReflection,
    StrongStreak,
}

impl MotivationCase {
    /// Key used for prompt templates in the goal bank.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::LowFollow => "low_follow",
            Self::RepeatGoal => "repeat_goal",
            Self::UnclearReflection => "unclear_reflection",
            Self::StrongStreak => "strong_streak",
        }
    }
}

impl fmt::Display for MotivationCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Tunable classifier thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low_follow: usize,
    pub repeat_goal: usize,
    pub vague_length: usize,
    pub strong_streak: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_follow: 2,
            repeat_goal: 3,
            vague_length: 15,
            strong_streak: 3,
        }
    }
}

/// Pick at most one motivation case. Rules are checked in priority order and
/// the first match wins: low follow-through, repeated goal, unclear
/// reflection, strong streak.
pub fn classify(
    history: &[GoalHistoryEntry],
    current_goal: &str,
    current_reflection: &str,
    thresholds: &Thresholds,
) -> Option<MotivationCase> {
    let recent = &history[history.len().saturating_sub(WINDOW)..];

    let low = recent
        .iter()
        .filter(|e| e.achievement.is_one_of(&[0, 1]))
        .count();
    if low >= thresholds.low_follow {
        return Some(MotivationCase::LowFollow);
    }

    let repeats = recent.iter().filter(|e| e.goal_text == current_goal).count();
    if repeats >= thresholds.repeat_goal {
        return Some(MotivationCase::RepeatGoal);
    }

    if current_reflection.trim().chars().count() < thresholds.vague_length {
        return Some(MotivationCase::UnclearReflection);
    }

    let strong = recent
        .iter()
        .filter(|e| e.achievement.is_one_of(&[3, 4]))
        .count();
    if strong >= thresholds.strong_streak {
        return Some(MotivationCase::StrongStreak);
    }

    None
}
