//! Step router: a pure `(state, event, context) → (state', commands)`
//! transition function.
//!
//! The router never talks to the store or the LLM. Reads arrive through
//! `StepContext`; writes and generation requests leave as `Command`s that
//! `ReflectionFlow` executes. Commands that produce a result the router needs
//! (registration outcome, coach reply) are answered with a follow-up event.

use chrono::NaiveDate;

use crate::demo::DEMO_STUDENT_IDS;
use crate::error::FlowError;
use crate::goal_bank::GoalBank;
use crate::llm::ChatMessage;

use super::classifier::{MotivationCase, classify};
use super::model::{
    Achievement, FIRST_GOAL_REFLECTION, GoalHistoryEntry, GoalToReflect,
    INITIAL_GOAL_INTERPRETATION, MANUAL_GOAL_MEASURE, Provenance, Student, Tone,
    interpretation_for,
};
use super::prompts::{
    coach_messages, coach_system_prompt, combine_warmup, opening_context,
    reflection_summary_messages, trailing_reflections, warmup_summary_messages,
};
use super::state::{ChatSession, CoachPersona, Notice, ReplyLength, SessionState, Step};

/// Input from the student (or a follow-up from an executed command).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SubmitId {
        student_id: String,
    },
    Register {
        nickname: String,
        pronoun_code: String,
        tone: Tone,
    },
    /// Follow-up to `Command::CreateStudent`.
    StudentCreated {
        created: bool,
    },
    SubmitWarmup {
        response: String,
        moods: Vec<String>,
    },
    /// `Some(goal)` confirms a goal set outside the app; a blank goal text
    /// reuses the student's stored goal. `None` declines.
    ConfirmManualGoal {
        goal: Option<String>,
    },
    SubmitReflection {
        score: u8,
        reflection: String,
    },
    ChooseCoach {
        persona: CoachPersona,
    },
    SendChat {
        message: String,
        length: ReplyLength,
    },
    /// Follow-up to `Command::GenerateCoachReply`.
    CoachReplied {
        text: String,
    },
    SkipChat,
    /// A blank `goal_range` keeps whatever range the student had.
    SubmitGoal {
        goal: String,
        success_measure: String,
        goal_range: Option<String>,
    },
    Restart,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitId { .. } => "submit_id",
            Self::Register { .. } => "register",
            Self::StudentCreated { .. } => "student_created",
            Self::SubmitWarmup { .. } => "submit_warmup",
            Self::ConfirmManualGoal { .. } => "confirm_manual_goal",
            Self::SubmitReflection { .. } => "submit_reflection",
            Self::ChooseCoach { .. } => "choose_coach",
            Self::SendChat { .. } => "send_chat",
            Self::CoachReplied { .. } => "coach_replied",
            Self::SkipChat => "skip_chat",
            Self::SubmitGoal { .. } => "submit_goal",
            Self::Restart => "restart",
        }
    }
}

/// A side-effect for the flow to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateStudent(Student),
    /// Store `background_info` verbatim.
    UpdateBackground {
        student_id: String,
        background_info: String,
    },
    /// Generate a background summary from `messages` and store it (or the
    /// fallback text when generation fails).
    RefreshBackground {
        student_id: String,
        messages: Vec<ChatMessage>,
    },
    AppendHistory(GoalHistoryEntry),
    UpdateCurrentGoal {
        student_id: String,
        goal: String,
        success_measures: String,
        set_date: NaiveDate,
        goal_range: Option<String>,
    },
    GenerateCoachReply {
        messages: Vec<ChatMessage>,
    },
}

/// What the router reads. Loaded by the flow before every transition.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub today: NaiveDate,
    pub student: Option<&'a Student>,
    /// The student's history, oldest first.
    pub history: &'a [GoalHistoryEntry],
    pub bank: &'a GoalBank,
    /// Demo students are seeded, so their stored goals are tagged as demo data.
    pub demo_students: bool,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub commands: Vec<Command>,
}

impl Transition {
    fn to(state: SessionState) -> Self {
        Self {
            state,
            commands: Vec::new(),
        }
    }

    fn with(state: SessionState, commands: Vec<Command>) -> Self {
        Self { state, commands }
    }
}

/// Apply `event` to `state`.
///
/// On error the caller's state is untouched and no command was produced.
pub fn transition(
    state: &SessionState,
    event: Event,
    ctx: &StepContext<'_>,
) -> Result<Transition, FlowError> {
    if event == Event::Restart {
        return Ok(Transition::to(SessionState::new()));
    }

    match (state.step, event) {
        (Step::EnterId | Step::OnboardStudent, Event::SubmitId { student_id }) => {
            submit_id(state, &student_id, ctx)
        }
        (Step::OnboardStudent, Event::Register { nickname, pronoun_code, tone }) => {
            let student_id = require_id(state)?;
            let student = Student::new(student_id, &nickname, &pronoun_code, tone);
            Ok(Transition::with(state.clone(), vec![Command::CreateStudent(student)]))
        }
        (Step::OnboardStudent, Event::StudentCreated { created }) => {
            let mut next = state.clone();
            if created {
                next.notice = None;
                next.go_to(Step::Warmup);
            } else {
                next.notice = Some(Notice::AlreadyRegistered);
            }
            Ok(Transition::to(next))
        }
        (Step::Warmup, Event::SubmitWarmup { response, moods }) => {
            submit_warmup(state, &response, &moods, ctx)
        }
        (Step::CheckManualGoal, Event::ConfirmManualGoal { goal }) => {
            let student = require_student(state, ctx)?;
            let mut next = state.clone();
            match goal {
                Some(text) => {
                    let text = if text.trim().is_empty() {
                        student.current_goal.clone()
                    } else {
                        text.trim().to_string()
                    };
                    next.goal_to_reflect = Some(GoalToReflect {
                        text,
                        set_date: Some(ctx.today),
                        provenance: Provenance::Manual,
                    });
                    next.go_to(Step::ReflectOnGoal);
                }
                None => next.go_to(Step::SetContributionGoal),
            }
            Ok(Transition::to(next))
        }
        (Step::ReflectOnGoal, Event::SubmitReflection { score, reflection }) => {
            submit_reflection(state, score, &reflection, ctx)
        }
        (Step::ChatbotMotivation, Event::ChooseCoach { persona }) if state.chat.persona.is_none() => {
            let mut next = state.clone();
            next.chat.persona = Some(persona);
            let goal_text = state
                .goal_to_reflect
                .as_ref()
                .map(|g| g.text.as_str())
                .unwrap_or("");
            let mut opening = opening_context(
                goal_text,
                state.latest_score,
                state.latest_reflection.as_deref(),
                state.motivation_case,
            );
            if state.motivation_case == Some(MotivationCase::Onboarding) {
                let background = ctx.student.map(|s| s.background_info.trim()).unwrap_or("");
                if !background.is_empty() {
                    opening.push_str(&format!("\nA bit about me today: {background}"));
                }
            }
            next.chat.transcript.push(ChatMessage::user(opening));
            let command = coach_reply_command(&next, persona, ctx);
            Ok(Transition::with(next, vec![command]))
        }
        (Step::ChatbotMotivation, Event::SendChat { message, length }) => {
            let persona = state.chat.persona.ok_or(FlowError::CoachNotChosen)?;
            if state.chat.is_exhausted() {
                return Err(FlowError::ChatExhausted {
                    max: super::state::MAX_COACH_TURNS,
                });
            }
            let message = message.trim();
            if message.is_empty() {
                return Err(FlowError::EmptyMessage);
            }
            let mut next = state.clone();
            next.chat.length = length;
            next.chat.transcript.push(ChatMessage::user(message));
            let command = coach_reply_command(&next, persona, ctx);
            Ok(Transition::with(next, vec![command]))
        }
        (Step::ChatbotMotivation, Event::CoachReplied { text }) => {
            let mut next = state.clone();
            next.chat.transcript.push(ChatMessage::assistant(text));
            next.chat.turn_count += 1;
            if next.chat.is_exhausted() {
                next.chat = ChatSession::default();
                next.go_to(Step::SetContributionGoal);
            }
            Ok(Transition::to(next))
        }
        (Step::ChatbotMotivation, Event::SkipChat) => {
            let mut next = state.clone();
            next.chat = ChatSession::default();
            next.go_to(Step::SetContributionGoal);
            Ok(Transition::to(next))
        }
        (Step::SetContributionGoal, Event::SubmitGoal { goal, success_measure, goal_range }) => {
            submit_goal(state, &goal, &success_measure, goal_range.as_deref(), ctx)
        }
        (step, event) => Err(FlowError::UnexpectedEvent {
            step,
            event: event.name(),
        }),
    }
}

fn require_id(state: &SessionState) -> Result<&str, FlowError> {
    state
        .student_id
        .as_deref()
        .ok_or(FlowError::EmptyStudentId)
}

fn require_student<'a>(
    state: &SessionState,
    ctx: &StepContext<'a>,
) -> Result<&'a Student, FlowError> {
    let student_id = require_id(state)?;
    ctx.student
        .filter(|s| s.student_id == student_id)
        .ok_or_else(|| FlowError::StudentMissing(student_id.to_string()))
}

fn submit_id(
    state: &SessionState,
    student_id: &str,
    ctx: &StepContext<'_>,
) -> Result<Transition, FlowError> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(FlowError::EmptyStudentId);
    }

    let mut next = SessionState {
        step: state.step,
        student_id: Some(student_id.to_string()),
        ..SessionState::default()
    };

    if ctx.student.is_some_and(|s| s.student_id == student_id) {
        next.go_to(Step::Warmup);
    } else {
        next.notice = Some(Notice::StudentNotFound);
        next.go_to(Step::OnboardStudent);
    }
    Ok(Transition::to(next))
}

fn submit_warmup(
    state: &SessionState,
    response: &str,
    moods: &[String],
    ctx: &StepContext<'_>,
) -> Result<Transition, FlowError> {
    let student = require_student(state, ctx)?;
    let combined = combine_warmup(response, moods);
    let mut next = state.clone();
    next.chat = ChatSession::default();

    // First visit: keep the raw check-in and go straight to the coach.
    if ctx.history.is_empty() {
        next.goal_to_reflect = Some(GoalToReflect {
            text: student.current_goal.clone(),
            set_date: student.current_goal_set_date,
            provenance: Provenance::Onboard,
        });
        next.motivation_case = Some(MotivationCase::Onboarding);
        next.go_to(Step::ChatbotMotivation);
        let command = Command::UpdateBackground {
            student_id: student.student_id.clone(),
            background_info: combined,
        };
        return Ok(Transition::with(next, vec![command]));
    }

    let command = Command::RefreshBackground {
        student_id: student.student_id.clone(),
        messages: warmup_summary_messages(&student.background_info, &combined),
    };

    if student.goal_is_recent(ctx.today, ctx.bank.days_since_goal_cutoff()) {
        let provenance =
            if ctx.demo_students && DEMO_STUDENT_IDS.contains(&student.student_id.as_str()) {
                Provenance::Demo
            } else {
                Provenance::App
            };
        next.goal_to_reflect = Some(GoalToReflect {
            text: student.current_goal.clone(),
            set_date: student.current_goal_set_date,
            provenance,
        });
        next.go_to(Step::ReflectOnGoal);
    } else {
        next.go_to(Step::CheckManualGoal);
    }
    Ok(Transition::with(next, vec![command]))
}

fn submit_reflection(
    state: &SessionState,
    score: u8,
    reflection: &str,
    ctx: &StepContext<'_>,
) -> Result<Transition, FlowError> {
    let interpretation = interpretation_for(score).ok_or(FlowError::InvalidScore(score))?;
    let student = require_student(state, ctx)?;
    let goal = state.goal_to_reflect.clone().unwrap_or_else(|| GoalToReflect {
        text: student.current_goal.clone(),
        set_date: student.current_goal_set_date,
        provenance: Provenance::App,
    });

    let success_measure = if goal.provenance == Provenance::Manual {
        MANUAL_GOAL_MEASURE.to_string()
    } else {
        student.current_success_measures.clone()
    };

    let reflection = reflection.trim();
    let entry = GoalHistoryEntry {
        student_id: student.student_id.clone(),
        goal_text: goal.text.clone(),
        goal_set_date: goal.set_date,
        success_measure,
        outcome_reflection: reflection.to_string(),
        achievement: Achievement::Score(score),
        interpretation: interpretation.to_string(),
        background_info: student.background_info.clone(),
    };

    // Past entries only; the current reflection is judged separately.
    let case = classify(
        ctx.history,
        &goal.text,
        reflection,
        &ctx.bank.classifier_thresholds(),
    );

    // The summary covers the history as it will be after the append.
    let mut history = ctx.history.to_vec();
    history.push(entry.clone());

    let mut commands = vec![Command::AppendHistory(entry)];
    let reflections = trailing_reflections(&history);
    if !reflections.is_empty() {
        commands.push(Command::RefreshBackground {
            student_id: student.student_id.clone(),
            messages: reflection_summary_messages(&reflections),
        });
    }

    let mut next = state.clone();
    next.goal_to_reflect = Some(goal);
    next.latest_reflection = Some(reflection.to_string());
    next.latest_score = Some(score);
    next.motivation_case = case;
    next.chat = ChatSession::default();
    next.go_to(Step::ChatbotMotivation);
    Ok(Transition::with(next, commands))
}

fn submit_goal(
    state: &SessionState,
    goal: &str,
    success_measure: &str,
    goal_range: Option<&str>,
    ctx: &StepContext<'_>,
) -> Result<Transition, FlowError> {
    let goal = goal.trim();
    if !ctx.bank.contains_goal(goal) {
        return Err(FlowError::UnknownGoal(goal.to_string()));
    }
    let student = require_student(state, ctx)?;
    let success_measure = success_measure.trim();

    let mut commands = vec![Command::UpdateCurrentGoal {
        student_id: student.student_id.clone(),
        goal: goal.to_string(),
        success_measures: success_measure.to_string(),
        set_date: ctx.today,
        goal_range: goal_range
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    }];

    if ctx.history.is_empty() {
        commands.push(Command::AppendHistory(GoalHistoryEntry {
            student_id: student.student_id.clone(),
            goal_text: goal.to_string(),
            goal_set_date: Some(ctx.today),
            success_measure: success_measure.to_string(),
            outcome_reflection: FIRST_GOAL_REFLECTION.to_string(),
            achievement: Achievement::NoPriorGoal,
            interpretation: INITIAL_GOAL_INTERPRETATION.to_string(),
            background_info: student.background_info.clone(),
        }));
    }

    let mut next = state.clone();
    next.go_to(Step::Done);
    Ok(Transition::with(next, commands))
}

fn coach_reply_command(state: &SessionState, persona: CoachPersona, ctx: &StepContext<'_>) -> Command {
    let student = state
        .student_id
        .as_deref()
        .and_then(|id| ctx.student.filter(|s| s.student_id == id));
    let system = coach_system_prompt(
        persona,
        student,
        ctx.bank.prompt_for(state.motivation_case),
        state.chat.length,
    );
    Command::GenerateCoachReply {
        messages: coach_messages(system, &state.chat.transcript),
    }
}
