//! Prompt builders for background summaries and the coaching conversation.

use crate::llm::ChatMessage;

use super::classifier::MotivationCase;
use super::model::{GoalHistoryEntry, Student, interpretation_for};
use super::state::{CoachPersona, ReplyLength};

/// Stored when a background summary cannot be generated.
pub const BACKGROUND_FALLBACK: &str = "Summary unavailable.";

/// Shown when the coach cannot reply.
pub const COACH_FALLBACK: &str =
    "Sorry, I couldn't come up with a response right now. Let's keep going!";

/// How many recent reflections feed the background summary.
pub const SUMMARY_WINDOW: usize = 10;

/// Reflections this short (trimmed) say nothing worth summarizing.
const TRIVIAL_REFLECTION_LEN: usize = 5;

pub const SUMMARY_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_MAX_TOKENS: u32 = 150;
pub const COACH_TEMPERATURE: f32 = 0.8;
pub const COACH_MAX_TOKENS: u32 = 300;

/// Merge the warm-up answer and selected mood words into one text.
pub fn combine_warmup(response: &str, moods: &[String]) -> String {
    let response = response.trim();
    let moods: Vec<&str> = moods
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect();

    match (response.is_empty(), moods.is_empty()) {
        (true, true) => String::new(),
        (false, true) => response.to_string(),
        (true, false) => format!("Feeling: {}", moods.join(", ")),
        (false, false) => format!("Feeling: {}. {}", moods.join(", "), response),
    }
}

/// Prompt that folds today's check-in into the stored background info.
pub fn warmup_summary_messages(existing: &str, checkin: &str) -> Vec<ChatMessage> {
    let existing = if existing.trim().is_empty() {
        "(nothing yet)"
    } else {
        existing.trim()
    };
    vec![
        ChatMessage::system(
            "You maintain a short profile of a student's interests and feelings for a \
             classroom coach. Write 2-3 plain sentences, third person, no lists. \
             Keep lasting interests; replace outdated moods with today's.",
        ),
        ChatMessage::user(format!(
            "Current profile:\n{existing}\n\nToday's check-in:\n{checkin}\n\nUpdated profile:"
        )),
    ]
}

/// The last `SUMMARY_WINDOW` outcome reflections with more than a few
/// characters, oldest first.
pub fn trailing_reflections(history: &[GoalHistoryEntry]) -> Vec<&str> {
    let meaningful: Vec<&str> = history
        .iter()
        .map(|e| e.outcome_reflection.trim())
        .filter(|r| r.chars().count() > TRIVIAL_REFLECTION_LEN)
        .collect();
    let start = meaningful.len().saturating_sub(SUMMARY_WINDOW);
    meaningful[start..].to_vec()
}

/// Prompt that rebuilds background info from recent reflections.
pub fn reflection_summary_messages(reflections: &[&str]) -> Vec<ChatMessage> {
    let listed = reflections
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ChatMessage::system(
            "Summarize what these class-participation reflections reveal about the \
             student: patterns, obstacles, what helps them. 2-3 plain sentences, \
             third person.",
        ),
        ChatMessage::user(format!("Reflections, oldest first:\n{listed}")),
    ]
}

fn persona_instructions(persona: CoachPersona) -> &'static str {
    match persona {
        CoachPersona::RealOne => {
            "You are \"the real one\": a supportive coach who tells it straight. \
             Be warm, honest and specific. Call out excuses gently and always end \
             with one concrete thing to try."
        }
        CoachPersona::DrillSergeant => {
            "You are a drill-sergeant coach. High energy, high expectations, short \
             punchy sentences. Push the student hard but never insult them, and \
             always end with a clear order for next class."
        }
    }
}

/// System prompt for the coaching conversation.
pub fn coach_system_prompt(
    persona: CoachPersona,
    student: Option<&Student>,
    case_template: &str,
    length: ReplyLength,
) -> String {
    let mut parts = vec![
        "You coach a middle or high school student on participating in class discussions."
            .to_string(),
        persona_instructions(persona).to_string(),
    ];

    if let Some(student) = student {
        let mut about = format!(
            "Student: {} (prefers a {} tone)",
            student.display_name(),
            student.tone.as_str().to_lowercase()
        );
        if !student.pronoun_code.is_empty() {
            about.push_str(&format!(", pronouns {}", student.pronoun_code));
        }
        parts.push(about);
        if !student.background_info.trim().is_empty() {
            parts.push(format!("Background: {}", student.background_info.trim()));
        }
    }

    if !case_template.is_empty() {
        parts.push(format!("Focus: {case_template}"));
    }

    parts.push(length.instruction().to_string());
    parts.join("\n\n")
}

/// First user-side message of the conversation, synthesized from the
/// reflection so the student doesn't have to type anything.
pub fn opening_context(
    goal: &str,
    score: Option<u8>,
    reflection: Option<&str>,
    case: Option<MotivationCase>,
) -> String {
    if case == Some(MotivationCase::Onboarding) {
        return "This is my first time here. I haven't set a participation goal yet.".to_string();
    }

    let mut lines = Vec::new();
    if !goal.trim().is_empty() {
        lines.push(format!("My goal was: {}", goal.trim()));
    }
    if let Some(score) = score {
        let label = interpretation_for(score).unwrap_or("Unrated");
        lines.push(format!("I rated myself {score}/4 ({label})."));
    }
    match reflection.map(str::trim) {
        Some(r) if !r.is_empty() => lines.push(format!("What happened: {r}")),
        _ => lines.push("I didn't write much about what happened.".to_string()),
    }
    lines.join("\n")
}

/// Full message list for a coach reply: system prompt plus the transcript.
pub fn coach_messages(system_prompt: String, transcript: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(transcript.iter().cloned());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::reflection::model::{Achievement, Tone};

    fn entry(reflection: &str) -> GoalHistoryEntry {
        GoalHistoryEntry {
            student_id: "1".into(),
            goal_text: "Goal 1".into(),
            goal_set_date: None,
            success_measure: String::new(),
            outcome_reflection: reflection.into(),
            achievement: Achievement::Score(2),
            interpretation: String::new(),
            background_info: String::new(),
        }
    }

    #[test]
    fn combine_warmup_variants() {
        assert_eq!(combine_warmup("  ", &[]), "");
        assert_eq!(combine_warmup("pretty good", &[]), "pretty good");
        assert_eq!(
            combine_warmup("", &["tired".into(), " ".into(), "calm".into()]),
            "Feeling: tired, calm"
        );
        assert_eq!(
            combine_warmup("big game later", &["excited".into()]),
            "Feeling: excited. big game later"
        );
    }

    #[test]
    fn trailing_reflections_skips_trivial_and_caps() {
        let mut history: Vec<GoalHistoryEntry> =
            (0..12).map(|i| entry(&format!("reflection number {i}"))).collect();
        history.push(entry("ok"));
        history.push(entry("  fine  "));

        let picked = trailing_reflections(&history);
        assert_eq!(picked.len(), SUMMARY_WINDOW);
        assert_eq!(picked[0], "reflection number 2");
        assert_eq!(picked[9], "reflection number 11");
    }

    #[test]
    fn trailing_reflections_boundary_length() {
        let history = vec![entry("12345"), entry("123456")];
        assert_eq!(trailing_reflections(&history), vec!["123456"]);
    }

    #[test]
    fn warmup_summary_includes_both_parts() {
        let messages = warmup_summary_messages("", "Feeling: calm");
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("(nothing yet)"));
        assert!(messages[1].content.contains("Feeling: calm"));
    }

    #[test]
    fn coach_prompt_personalizes() {
        let mut student = Student::new("100", "Jo", "she/her", Tone::Challenger);
        student.background_info = "Loves soccer.".into();
        let prompt = coach_system_prompt(
            CoachPersona::DrillSergeant,
            Some(&student),
            "Celebrate the streak.",
            ReplyLength::Long,
        );
        assert!(prompt.contains("drill-sergeant"));
        assert!(prompt.contains("Jo"));
        assert!(prompt.contains("challenger tone"));
        assert!(prompt.contains("she/her"));
        assert!(prompt.contains("Loves soccer."));
        assert!(prompt.contains("Celebrate the streak."));
        assert!(prompt.contains("3-5 sentences"));
    }

    #[test]
    fn coach_prompt_without_student() {
        let prompt = coach_system_prompt(CoachPersona::RealOne, None, "", ReplyLength::Short);
        assert!(prompt.contains("the real one"));
        assert!(!prompt.contains("Background:"));
        assert!(!prompt.contains("Focus:"));
        assert!(prompt.contains("2-3 sentences"));
    }

    #[test]
    fn opening_context_from_reflection() {
        let text = opening_context(
            "Goal 3: Raise my hand",
            Some(3),
            Some("Raised my hand twice."),
            Some(MotivationCase::StrongStreak),
        );
        assert!(text.contains("Goal 3: Raise my hand"));
        assert!(text.contains("3/4 (Met goal)"));
        assert!(text.contains("Raised my hand twice."));
    }

    #[test]
    fn opening_context_onboarding() {
        let text = opening_context("", None, None, Some(MotivationCase::Onboarding));
        assert!(text.contains("first time"));
    }

    #[test]
    fn coach_messages_prepends_system() {
        let transcript = vec![ChatMessage::user("hi"), ChatMessage::assistant("hey")];
        let messages = coach_messages("sys".into(), &transcript);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("sys"));
        assert_eq!(messages[2], ChatMessage::assistant("hey"));
    }
}
