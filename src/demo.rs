//! Demo students for trying the wizard without real data.
//!
//! - 100 repeats the same easy goal and always scores 4.
//! - 200 keeps missing a medium goal (scores 0 or 1).
//! - 300 takes stretch goals and scores 3 or 4.
//!
//! Each has three history entries dated 4, 3 and 1 days before `today`.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::DatabaseError;
use crate::goal_bank::GoalBank;
use crate::reflection::model::{Achievement, GoalHistoryEntry, Student, Tone, interpretation_for};
use crate::store::RecordStore;

/// IDs of the seeded demo students.
pub const DEMO_STUDENT_IDS: [&str; 3] = ["100", "200", "300"];

const DEMO_SEED: u64 = 0x600d_601a;
const DAYS_AGO: [i64; 3] = [4, 3, 1];

const MOODS: &[&str] = &[
    "Curious and a little nervous.",
    "Tired but trying to stay focused.",
    "Felt confident today.",
    "Had a tough morning, but ready now.",
    "Looking forward to the weekend.",
    "Distracted by stuff outside of school.",
    "Burned out but still showing up.",
    "Feeling energized.",
    "Focused on the goal.",
    "Meh. Just meh.",
];

struct DemoEntry {
    goal_index: usize,
    score: u8,
    reflection: &'static str,
    background: String,
}

struct DemoStudent {
    id: &'static str,
    nickname: &'static str,
    tone: Tone,
    measure: &'static str,
    entries: Vec<DemoEntry>,
}

fn mood(rng: &mut StdRng) -> String {
    MOODS.choose(rng).copied().unwrap_or_default().to_string()
}

fn demo_students(rng: &mut StdRng) -> Vec<DemoStudent> {
    let steady = DemoStudent {
        id: "100",
        nickname: "Jordan",
        tone: Tone::Coach,
        measure: "I'll know because I say something every time.",
        entries: (0..3)
            .map(|_| DemoEntry {
                goal_index: 0,
                score: 4,
                reflection: "Said something like always. No big deal.",
                background: "Confident and a little bored.".to_string(),
            })
            .collect(),
    };

    let struggling_reflections = [
        "I just forgot again.",
        "I wanted to speak but someone else always jumped in.",
        "Felt unsure what to say.",
    ];
    let struggling = DemoStudent {
        id: "200",
        nickname: "Riley",
        tone: Tone::Reflective,
        measure: "I'll know if I speak during group work.",
        entries: struggling_reflections
            .into_iter()
            .map(|reflection| DemoEntry {
                goal_index: 1,
                score: [0, 1, 1].choose(&mut *rng).copied().unwrap_or(1),
                reflection,
                background: mood(&mut *rng),
            })
            .collect(),
    };

    let stretch_plan = [
        (4, "More people joined the conversation because I invited them."),
        (6, "Tried the phrase and it helped people listen."),
        (8, "Everyone was into it today, good flow."),
    ];
    let stretching = DemoStudent {
        id: "300",
        nickname: "Sky",
        tone: Tone::Challenger,
        measure: "Others contribute, and I push my thinking.",
        entries: stretch_plan
            .iter()
            .enumerate()
            .map(|(i, &(goal_index, reflection))| DemoEntry {
                goal_index,
                score: 3 + rng.gen_range(0..=1),
                reflection,
                background: if i == 0 {
                    "Energized, focused, and loving class today.".to_string()
                } else {
                    mood(&mut *rng)
                },
            })
            .collect(),
    };

    vec![steady, struggling, stretching]
}

/// Seed the demo students. Students that already exist are left alone.
/// Returns how many were created.
pub async fn seed_demo_students(
    store: &dyn RecordStore,
    bank: &GoalBank,
    today: NaiveDate,
) -> Result<usize, DatabaseError> {
    let mut rng = StdRng::seed_from_u64(DEMO_SEED);
    let goal = |index: usize| {
        bank.goals
            .get(index)
            .or_else(|| bank.goals.last())
            .cloned()
            .unwrap_or_default()
    };

    let mut created = 0;
    for demo in demo_students(&mut rng) {
        let mut student = Student::new(demo.id, demo.nickname, "", demo.tone);
        let Some(latest) = demo.entries.last() else {
            continue;
        };
        student.current_goal = goal(latest.goal_index);
        student.current_success_measures = demo.measure.to_string();
        student.current_goal_set_date = Some(today - Duration::days(DAYS_AGO[2]));
        student.background_info = latest.background.clone();

        if !store.create_student(&student).await? {
            tracing::debug!(student_id = demo.id, "Demo student already present");
            continue;
        }

        for (entry, days_ago) in demo.entries.iter().zip(DAYS_AGO) {
            store
                .append_history_entry(&GoalHistoryEntry {
                    student_id: demo.id.to_string(),
                    goal_text: goal(entry.goal_index),
                    goal_set_date: Some(today - Duration::days(days_ago)),
                    success_measure: demo.measure.to_string(),
                    outcome_reflection: entry.reflection.to_string(),
                    achievement: Achievement::Score(entry.score),
                    interpretation: interpretation_for(entry.score)
                        .unwrap_or_default()
                        .to_string(),
                    background_info: entry.background.clone(),
                })
                .await?;
        }
        created += 1;
    }

    tracing::info!(created, "Demo students seeded");
    Ok(created)
}
