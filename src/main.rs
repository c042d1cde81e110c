use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use goal_reflect::config::AppConfig;
use goal_reflect::demo::{DEMO_STUDENT_IDS, seed_demo_students};
use goal_reflect::error::Error;
use goal_reflect::goal_bank::GoalBank;
use goal_reflect::llm::create_provider;
use goal_reflect::reflection::model::GOAL_RANGES;
use goal_reflect::reflection::{
    CoachPersona, Event, Notice, ReflectionFlow, ReplyLength, SessionState, Step, Student, Tone,
};
use goal_reflect::store::{LibSqlBackend, RecordStore};

/// Line-based prompts over stdin/stdout. Logs and the banner go to stderr.
struct Terminal {
    lines: Lines<BufReader<Stdin>>,
    restart_requested: bool,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            restart_requested: false,
        }
    }

    /// Print `prompt` and read one trimmed line. `None` on EOF, `/quit` or
    /// `/restart` (which also sets `restart_requested`).
    async fn ask(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        print!("{prompt} ");
        std::io::stdout().flush().context("flushing stdout")?;
        match self.lines.next_line().await.context("reading stdin")? {
            Some(line) => match line.trim() {
                "/quit" => Ok(None),
                "/restart" => {
                    self.restart_requested = true;
                    Ok(None)
                }
                answer => Ok(Some(answer.to_string())),
            },
            None => Ok(None),
        }
    }

    fn take_restart(&mut self) -> bool {
        std::mem::take(&mut self.restart_requested)
    }

    async fn yes(&mut self, prompt: &str) -> anyhow::Result<Option<bool>> {
        Ok(self
            .ask(&format!("{prompt} [y/n]"))
            .await?
            .map(|a| a.to_ascii_lowercase().starts_with('y')))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let bank = Arc::new(config.load_goal_bank().context("loading goal bank")?);
    let llm = create_provider(&config.llm)?;

    let store: Arc<dyn RecordStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    eprintln!("🎯 Goal Reflect v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());

    if config.seed_demo {
        let created = seed_demo_students(store.as_ref(), &bank, Local::now().date_naive()).await?;
        eprintln!(
            "   Demo students: {created} seeded (IDs {})",
            DEMO_STUDENT_IDS.join(", ")
        );
    }
    eprintln!("   Type /quit to exit or /restart to start over.\n");

    let flow = ReflectionFlow::new(store.clone(), llm, bank).with_demo_students(config.seed_demo);
    let mut term = Terminal::new();
    let mut state = SessionState::new();

    loop {
        let event = match next_event(&mut term, &state, flow.bank()).await? {
            Some(event) => event,
            None if term.take_restart() => Event::Restart,
            None => break,
        };
        match flow.handle(state.clone(), event).await {
            Ok(outcome) => {
                for reply in &outcome.coach_replies {
                    println!("\nCoach: {reply}\n");
                }
                if outcome.state.step == Step::Warmup && state.step != Step::Warmup {
                    if let Some(id) = outcome.state.student_id.as_deref() {
                        if let Some(student) = store.get_student(id).await? {
                            print_profile(&student);
                        }
                    }
                }
                state = outcome.state;
            }
            Err(Error::Flow(e)) => println!("  ⚠ {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    eprintln!("Bye!");
    Ok(())
}

/// Prompt for the input the current step needs. `None` means quit.
async fn next_event(
    term: &mut Terminal,
    state: &SessionState,
    bank: &GoalBank,
) -> anyhow::Result<Option<Event>> {
    let event = match state.step {
        Step::EnterId => term
            .ask("Student ID:")
            .await?
            .map(|student_id| Event::SubmitId { student_id }),

        Step::OnboardStudent => {
            match state.notice {
                Some(Notice::AlreadyRegistered) => {
                    println!("That ID is already registered. Enter it again to continue.");
                    return Ok(term
                        .ask("Student ID:")
                        .await?
                        .map(|student_id| Event::SubmitId { student_id }));
                }
                _ => println!("We couldn't find that ID."),
            }
            match term.yes("Register as a new student?").await? {
                None => None,
                Some(false) => Some(Event::Restart),
                Some(true) => register(term).await?,
            }
        }

        Step::Warmup => warmup(term, bank).await?,

        Step::CheckManualGoal => match term.yes("Did you set a goal on paper since last time?").await? {
            None => None,
            Some(false) => Some(Event::ConfirmManualGoal { goal: None }),
            Some(true) => term
                .ask("What was the goal? (blank = your current goal)")
                .await?
                .map(|goal| Event::ConfirmManualGoal { goal: Some(goal) }),
        },

        Step::ReflectOnGoal => {
            if let Some(goal) = &state.goal_to_reflect {
                println!("\nYour goal: {}", goal.text);
            }
            println!("0 = didn't attempt, 1 = tried, 2 = almost, 3 = met, 4 = exceeded");
            let Some(raw) = term.ask("How did it go (0-4)?").await? else {
                return Ok(None);
            };
            let Ok(score) = raw.parse::<u8>() else {
                println!("  Please enter a number from 0 to 4.");
                return Box::pin(next_event(term, state, bank)).await;
            };
            term.ask("What happened?")
                .await?
                .map(|reflection| Event::SubmitReflection { score, reflection })
        }

        Step::ChatbotMotivation if state.chat.persona.is_none() => {
            println!("Pick a coach: 1) The Real One  2) Drill Sergeant  s) skip");
            match term.ask(">").await?.as_deref() {
                None => None,
                Some("1") => Some(Event::ChooseCoach { persona: CoachPersona::RealOne }),
                Some("2") => Some(Event::ChooseCoach { persona: CoachPersona::DrillSergeant }),
                Some(_) => Some(Event::SkipChat),
            }
        }

        Step::ChatbotMotivation => {
            let Some(message) = term
                .ask("You (blank to move on, start with /long for longer replies):")
                .await?
            else {
                return Ok(None);
            };
            if message.is_empty() {
                Some(Event::SkipChat)
            } else if let Some(rest) = message.strip_prefix("/long") {
                let rest = rest.trim();
                if rest.is_empty() {
                    println!("  Type your message after /long.");
                    return Box::pin(next_event(term, state, bank)).await;
                }
                Some(Event::SendChat { message: rest.to_string(), length: ReplyLength::Long })
            } else {
                Some(Event::SendChat { message, length: ReplyLength::Short })
            }
        }

        Step::SetContributionGoal => {
            println!("\nPick your next goal:");
            for (i, goal) in bank.goal_texts().iter().enumerate() {
                println!("  {}) {goal}", i + 1);
            }
            let Some(raw) = term.ask("Goal number:").await? else {
                return Ok(None);
            };
            let Some(goal) = raw
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| bank.goal_texts().get(i))
            else {
                println!("  Please pick one of the listed numbers.");
                return Box::pin(next_event(term, state, bank)).await;
            };
            let Some(success_measure) = term.ask("How will you know you met it?").await? else {
                return Ok(None);
            };
            let listed: Vec<String> = GOAL_RANGES
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{}) {r}", i + 1))
                .collect();
            println!("Goal range (optional): {}", listed.join("  "));
            term.ask("Range number (blank to skip):").await?.map(|picked| {
                let goal_range = picked
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| GOAL_RANGES.get(i))
                    .map(|r| r.to_string());
                Event::SubmitGoal {
                    goal: goal.clone(),
                    success_measure,
                    goal_range,
                }
            })
        }

        Step::Done => {
            println!("\n✅ All set. See you next class!");
            term.ask("Press Enter to start over.").await?.map(|_| Event::Restart)
        }
    };

    Ok(event)
}

fn print_profile(student: &Student) {
    let or_dash = |s: &str| if s.trim().is_empty() { "-".to_string() } else { s.to_string() };
    println!("\nHi {}!", or_dash(&student.nickname));
    println!("  Preferred tone:   {}", student.tone);
    println!("  Pronouns:         {}", or_dash(&student.pronoun_code));
    println!("  Current goal:     {}", or_dash(&student.current_goal));
    println!("  Success measures: {}", or_dash(&student.current_success_measures));
    println!("  Goal range:       {}", or_dash(student.goal_range.as_deref().unwrap_or("")));
}

async fn register(term: &mut Terminal) -> anyhow::Result<Option<Event>> {
    let Some(nickname) = term.ask("Nickname:").await? else {
        return Ok(None);
    };
    let Some(pronoun_code) = term.ask("Pronouns (optional):").await? else {
        return Ok(None);
    };
    let Some(tone) = term
        .ask("Preferred tone: 1) Reflective  2) Coach  3) Challenger")
        .await?
    else {
        return Ok(None);
    };
    let tone = match tone.as_str() {
        "2" => Tone::Coach,
        "3" => Tone::Challenger,
        other => Tone::parse_lenient(other),
    };
    Ok(Some(Event::Register {
        nickname,
        pronoun_code,
        tone,
    }))
}

async fn warmup(term: &mut Terminal, bank: &GoalBank) -> anyhow::Result<Option<Event>> {
    let category = if rand::random::<bool>() { "emotional" } else { "interest" };
    let question = bank
        .random_warmup(category)
        .unwrap_or("How are you doing today?");
    println!("\n{question}");

    if !bank.mood_words.is_empty() {
        let listed: Vec<String> = bank
            .mood_words
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{}) {w}", i + 1))
            .collect();
        println!("Moods: {}", listed.join("  "));
    }
    let Some(picked) = term.ask("Mood numbers (comma-separated, optional):").await? else {
        return Ok(None);
    };
    let moods = picked
        .split(',')
        .filter_map(|n| n.trim().parse::<usize>().ok())
        .filter_map(|n| n.checked_sub(1))
        .filter_map(|i| bank.mood_words.get(i).cloned())
        .collect();

    Ok(term
        .ask("Your answer:")
        .await?
        .map(|response| Event::SubmitWarmup { response, moods }))
}
