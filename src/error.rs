//! Error types for goal-reflect.

use std::time::Duration;

use crate::reflection::state::Step;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors raised by the step router when an event cannot be applied.
///
/// These never mutate the session: the caller keeps its previous state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("Event {event} is not accepted at step {step}")]
    UnexpectedEvent { step: Step, event: &'static str },

    #[error("Student ID must not be empty")]
    EmptyStudentId,

    #[error("Achievement score {0} is outside 0-4")]
    InvalidScore(u8),

    #[error("Goal is not in the goal bank: {0}")]
    UnknownGoal(String),

    #[error("Student {0} is not registered")]
    StudentMissing(String),

    #[error("Coaching conversation already used all {max} turns")]
    ChatExhausted { max: u32 },

    #[error("Pick a coach before chatting")]
    CoachNotChosen,

    #[error("Chat message must not be empty")]
    EmptyMessage,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
