//! Reflection steps and per-session state.

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

use super::classifier::MotivationCase;
use super::model::GoalToReflect;

/// Assistant replies allowed in one coaching conversation.
pub const MAX_COACH_TURNS: u32 = 3;

/// The screens of the reflection wizard.
///
/// Main path: EnterId → Warmup → ReflectOnGoal | CheckManualGoal →
/// ChatbotMotivation → SetContributionGoal → Done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    EnterId,
    OnboardStudent,
    Warmup,
    CheckManualGoal,
    ReflectOnGoal,
    ChatbotMotivation,
    SetContributionGoal,
    Done,
}

impl Step {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Restarting (any step back to `EnterId`) is handled separately and is
    /// not listed here.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        matches!(
            (self, target),
            (EnterId, Warmup)
                | (EnterId, OnboardStudent)
                | (OnboardStudent, OnboardStudent)
                | (OnboardStudent, Warmup)
                | (Warmup, ReflectOnGoal)
                | (Warmup, CheckManualGoal)
                | (Warmup, ChatbotMotivation)
                | (CheckManualGoal, ReflectOnGoal)
                | (CheckManualGoal, SetContributionGoal)
                | (ReflectOnGoal, ChatbotMotivation)
                | (ChatbotMotivation, ChatbotMotivation)
                | (ChatbotMotivation, SetContributionGoal)
                | (SetContributionGoal, Done)
        )
    }

    /// Whether this step is terminal (only a restart leaves it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EnterId => "enter_id",
            Self::OnboardStudent => "onboard_student",
            Self::Warmup => "warmup",
            Self::CheckManualGoal => "check_manual_goal",
            Self::ReflectOnGoal => "reflect_on_goal",
            Self::ChatbotMotivation => "chatbot_motivation",
            Self::SetContributionGoal => "set_contribution_goal",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Coaching persona, picked by the student before the first reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachPersona {
    /// Supportive but direct.
    RealOne,
    /// Higher pressure.
    DrillSergeant,
}

/// How long the coach's replies should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyLength {
    #[default]
    Short,
    Long,
}

impl ReplyLength {
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Short => "Reply in 2-3 sentences.",
            Self::Long => "Reply in 3-5 sentences.",
        }
    }
}

/// The in-progress coaching conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub persona: Option<CoachPersona>,
    pub length: ReplyLength,
    /// User and assistant turns, oldest first. The opening context message
    /// is the first user turn.
    pub transcript: Vec<ChatMessage>,
    /// Assistant replies received so far.
    pub turn_count: u32,
}

impl ChatSession {
    pub fn is_exhausted(&self) -> bool {
        self.turn_count >= MAX_COACH_TURNS
    }
}

/// Something the presentation layer should tell the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    /// The entered ID has no record; registration is offered.
    StudentNotFound,
    /// Registration failed because the ID is taken.
    AlreadyRegistered,
}

/// Transient state for one pass through the wizard.
///
/// Discarded on restart. Nothing here is persisted by the router itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub step: Step,
    pub student_id: Option<String>,
    pub goal_to_reflect: Option<GoalToReflect>,
    pub chat: ChatSession,
    pub latest_reflection: Option<String>,
    pub latest_score: Option<u8>,
    pub motivation_case: Option<MotivationCase>,
    pub notice: Option<Notice>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `target`, logging (but not rejecting) edges the step graph
    /// does not list.
    pub(crate) fn go_to(&mut self, target: Step) {
        if !self.step.can_transition_to(target) {
            tracing::warn!(from = %self.step, to = %target, "Unlisted step transition");
        }
        self.step = target;
    }
}
