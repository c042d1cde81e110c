//! The reflection session: records, classifier, step router and flow driver.

pub mod classifier;
pub mod flow;
pub mod model;
pub mod prompts;
pub mod router;
pub mod state;

pub use classifier::{MotivationCase, Thresholds, classify};
pub use flow::{FlowOutcome, ReflectionFlow};
pub use model::{Achievement, GoalHistoryEntry, GoalToReflect, Provenance, Student, Tone};
pub use router::{Command, Event, StepContext, Transition, transition};
pub use state::{ChatSession, CoachPersona, Notice, ReplyLength, SessionState, Step};
