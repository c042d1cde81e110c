//! Flow driver: loads context, runs the router, executes its commands.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, Result};
use crate::goal_bank::GoalBank;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::RecordStore;

use super::model::{GoalHistoryEntry, Student};
use super::prompts::{
    BACKGROUND_FALLBACK, COACH_FALLBACK, COACH_MAX_TOKENS, COACH_TEMPERATURE, SUMMARY_MAX_TOKENS,
    SUMMARY_TEMPERATURE,
};
use super::router::{self, Command, Event, StepContext};
use super::state::SessionState;

/// What one `handle` call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOutcome {
    pub state: SessionState,
    /// Coach replies generated while handling the event, in order.
    pub coach_replies: Vec<String>,
}

/// Drives a reflection session against a record store and a text generator.
pub struct ReflectionFlow {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn LlmProvider>,
    bank: Arc<GoalBank>,
    demo_students: bool,
}

impl ReflectionFlow {
    pub fn new(store: Arc<dyn RecordStore>, llm: Arc<dyn LlmProvider>, bank: Arc<GoalBank>) -> Self {
        Self {
            store,
            llm,
            bank,
            demo_students: false,
        }
    }

    /// Tag the seeded demo students' goals as demo data.
    pub fn with_demo_students(mut self, enabled: bool) -> Self {
        self.demo_students = enabled;
        self
    }

    pub fn bank(&self) -> &GoalBank {
        &self.bank
    }

    /// Apply `event` using the local calendar date.
    pub async fn handle(&self, state: SessionState, event: Event) -> Result<FlowOutcome> {
        self.handle_on(state, event, Local::now().date_naive()).await
    }

    /// Apply `event` as if today were `today`.
    ///
    /// Follow-up events (registration result, coach reply) are applied
    /// before returning. On error the caller should keep its previous state;
    /// store writes that already ran are not rolled back.
    pub async fn handle_on(
        &self,
        state: SessionState,
        event: Event,
        today: NaiveDate,
    ) -> Result<FlowOutcome> {
        let mut state = state;
        let mut coach_replies = Vec::new();
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let lookup_id = match &event {
                Event::SubmitId { student_id } => Some(student_id.trim().to_string()),
                _ => state.student_id.clone(),
            };
            let (student, history) = self.load_context(lookup_id.as_deref()).await?;
            let ctx = StepContext {
                today,
                student: student.as_ref(),
                history: &history,
                bank: &self.bank,
                demo_students: self.demo_students,
            };

            let event_name = event.name();
            let from = state.step;
            let transition = router::transition(&state, event, &ctx)?;
            debug!(
                event = event_name,
                from = %from,
                to = %transition.state.step,
                commands = transition.commands.len(),
                "Transition applied"
            );
            state = transition.state;

            for command in transition.commands {
                if let Some(follow_up) = self.execute(command, &mut coach_replies).await? {
                    pending.push_back(follow_up);
                }
            }
        }

        if state.step.is_terminal() {
            info!(student_id = ?state.student_id, "Session complete");
        }

        Ok(FlowOutcome {
            state,
            coach_replies,
        })
    }

    async fn load_context(
        &self,
        student_id: Option<&str>,
    ) -> Result<(Option<Student>, Vec<GoalHistoryEntry>)> {
        let Some(student_id) = student_id.filter(|id| !id.is_empty()) else {
            return Ok((None, Vec::new()));
        };
        match self.store.get_student(student_id).await? {
            Some(student) => {
                let history = self.store.get_history_for_student(student_id).await?;
                Ok((Some(student), history))
            }
            None => Ok((None, Vec::new())),
        }
    }

    async fn execute(
        &self,
        command: Command,
        coach_replies: &mut Vec<String>,
    ) -> Result<Option<Event>> {
        match command {
            Command::CreateStudent(student) => {
                let created = self.store.create_student(&student).await?;
                Ok(Some(Event::StudentCreated { created }))
            }
            Command::UpdateBackground {
                student_id,
                background_info,
            } => {
                self.write_background(&student_id, &background_info).await?;
                Ok(None)
            }
            Command::RefreshBackground {
                student_id,
                messages,
            } => {
                let summary = self
                    .generate_or_fallback(
                        messages,
                        SUMMARY_TEMPERATURE,
                        SUMMARY_MAX_TOKENS,
                        BACKGROUND_FALLBACK,
                        "background_summary",
                    )
                    .await;
                self.write_background(&student_id, &summary).await?;
                Ok(None)
            }
            Command::AppendHistory(entry) => {
                self.store.append_history_entry(&entry).await?;
                info!(
                    student_id = %entry.student_id,
                    achievement = %entry.achievement.to_stored(),
                    "Reflection recorded"
                );
                Ok(None)
            }
            Command::UpdateCurrentGoal {
                student_id,
                goal,
                success_measures,
                set_date,
                goal_range,
            } => {
                let updated = self
                    .store
                    .update_current_goal(
                        &student_id,
                        &goal,
                        &success_measures,
                        set_date,
                        goal_range.as_deref(),
                        None,
                    )
                    .await?;
                if !updated {
                    return Err(DatabaseError::NotFound {
                        entity: "student".to_string(),
                        id: student_id,
                    }
                    .into());
                }
                info!(student_id = %student_id, goal = %goal, "New goal set");
                Ok(None)
            }
            Command::GenerateCoachReply { messages } => {
                let text = self
                    .generate_or_fallback(
                        messages,
                        COACH_TEMPERATURE,
                        COACH_MAX_TOKENS,
                        COACH_FALLBACK,
                        "coach_reply",
                    )
                    .await;
                coach_replies.push(text.clone());
                Ok(Some(Event::CoachReplied { text }))
            }
        }
    }

    async fn write_background(&self, student_id: &str, background_info: &str) -> Result<()> {
        if !self
            .store
            .update_background_info(student_id, background_info)
            .await?
        {
            warn!(student_id, "Background info not saved: student missing");
        }
        Ok(())
    }

    /// Generate text, substituting `fallback` on any failure or empty output.
    async fn generate_or_fallback(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
        fallback: &str,
        purpose: &'static str,
    ) -> String {
        let request = CompletionRequest::new(messages)
            .with_temperature(temperature)
            .with_max_tokens(max_tokens);

        match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let (input_cost, output_cost) = self.llm.cost_per_token();
                let cost = input_cost * Decimal::from(response.input_tokens)
                    + output_cost * Decimal::from(response.output_tokens);
                debug!(
                    purpose,
                    model = self.llm.model_name(),
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    cost = %cost,
                    "Generation succeeded"
                );
                response.content.trim().to_string()
            }
            Ok(_) => {
                warn!(purpose, "Generation returned empty text, using fallback");
                fallback.to_string()
            }
            Err(e) => {
                warn!(purpose, error = %e, "Generation failed, using fallback");
                fallback.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{Error, FlowError, LlmError};
    use crate::llm::CompletionResponse;
    use crate::reflection::model::Tone;
    use crate::reflection::state::{CoachPersona, Step};
    use crate::store::LibSqlBackend;

    /// Returns canned text and records every request.
    struct RecordingLlm {
        reply: Option<String>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingLlm {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "recording"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Some(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 10,
                    output_tokens: 5,
                }),
                None => Err(LlmError::RequestFailed {
                    provider: "recording".into(),
                    reason: "offline".into(),
                }),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    async fn flow_with(llm: Arc<RecordingLlm>) -> (ReflectionFlow, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let bank = Arc::new(GoalBank::builtin().unwrap());
        let flow = ReflectionFlow::new(store.clone(), llm, bank);
        (flow, store)
    }

    #[tokio::test]
    async fn registration_feeds_back_into_router() {
        let llm = Arc::new(RecordingLlm::replying("hi"));
        let (flow, store) = flow_with(llm).await;

        let out = flow
            .handle_on(SessionState::new(), Event::SubmitId { student_id: "555".into() }, today())
            .await
            .unwrap();
        assert_eq!(out.state.step, Step::OnboardStudent);

        let out = flow
            .handle_on(
                out.state,
                Event::Register {
                    nickname: "Lee".into(),
                    pronoun_code: String::new(),
                    tone: Tone::Coach,
                },
                today(),
            )
            .await
            .unwrap();
        assert_eq!(out.state.step, Step::Warmup);
        assert!(store.get_student("555").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn coach_reply_is_returned_and_recorded() {
        let llm = Arc::new(RecordingLlm::replying("  You got this.  "));
        let (flow, store) = flow_with(llm.clone()).await;
        store
            .create_student(&Student::new("1", "Max", "", Tone::Reflective))
            .await
            .unwrap();

        let mut state = SessionState::new();
        state.step = Step::ChatbotMotivation;
        state.student_id = Some("1".into());

        let out = flow
            .handle_on(state, Event::ChooseCoach { persona: CoachPersona::RealOne }, today())
            .await
            .unwrap();
        assert_eq!(out.coach_replies, vec!["You got this.".to_string()]);
        assert_eq!(out.state.chat.turn_count, 1);

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(COACH_TEMPERATURE));
        assert_eq!(requests[0].max_tokens, Some(COACH_MAX_TOKENS));
    }

    #[tokio::test]
    async fn failed_generation_uses_fallbacks() {
        let llm = Arc::new(RecordingLlm::failing());
        let (flow, store) = flow_with(llm).await;
        let mut student = Student::new("1", "Max", "", Tone::Reflective);
        student.current_goal = flow.bank().goals[0].clone();
        student.current_goal_set_date = Some(today());
        store.create_student(&student).await.unwrap();
        store
            .append_history_entry(&GoalHistoryEntry {
                student_id: "1".into(),
                goal_text: student.current_goal.clone(),
                goal_set_date: Some(today()),
                success_measure: String::new(),
                outcome_reflection: "[first goal]".into(),
                achievement: crate::reflection::model::Achievement::NoPriorGoal,
                interpretation: "Initial goal set".into(),
                background_info: String::new(),
            })
            .await
            .unwrap();

        let mut state = SessionState::new();
        state.step = Step::Warmup;
        state.student_id = Some("1".into());
        let out = flow
            .handle_on(
                state,
                Event::SubmitWarmup { response: "fine".into(), moods: vec![] },
                today(),
            )
            .await
            .unwrap();
        assert_eq!(out.state.step, Step::ReflectOnGoal);
        let stored = store.get_student("1").await.unwrap().unwrap();
        assert_eq!(stored.background_info, BACKGROUND_FALLBACK);

        let out = flow
            .handle_on(
                out.state,
                Event::SubmitReflection { score: 3, reflection: "Talked twice in my group.".into() },
                today(),
            )
            .await
            .unwrap();
        let out = flow
            .handle_on(out.state, Event::ChooseCoach { persona: CoachPersona::DrillSergeant }, today())
            .await
            .unwrap();
        assert_eq!(out.coach_replies, vec![COACH_FALLBACK.to_string()]);
    }

    #[tokio::test]
    async fn new_goal_stores_range() {
        let llm = Arc::new(RecordingLlm::replying("x"));
        let (flow, store) = flow_with(llm).await;
        let mut student = Student::new("1", "Max", "", Tone::Challenger);
        student.goal_range = Some("-2 to +2".into());
        store.create_student(&student).await.unwrap();

        let mut state = SessionState::new();
        state.step = Step::SetContributionGoal;
        state.student_id = Some("1".into());
        let goal = flow.bank().goals[3].clone();
        let out = flow
            .handle_on(
                state,
                Event::SubmitGoal {
                    goal: goal.clone(),
                    success_measure: "Two comments".into(),
                    goal_range: Some("0 to 1".into()),
                },
                today(),
            )
            .await
            .unwrap();
        assert_eq!(out.state.step, Step::Done);

        let stored = store.get_student("1").await.unwrap().unwrap();
        assert_eq!(stored.current_goal, goal);
        assert_eq!(stored.goal_range.as_deref(), Some("0 to 1"));
    }

    #[tokio::test]
    async fn router_errors_surface_as_flow_errors() {
        let llm = Arc::new(RecordingLlm::replying("x"));
        let (flow, _store) = flow_with(llm).await;
        let err = flow
            .handle_on(SessionState::new(), Event::SubmitId { student_id: " ".into() }, today())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Flow(FlowError::EmptyStudentId)));
    }
}
