//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::goal_bank::GoalBank;
use crate::llm::{LlmBackend, LlmConfig};

const DEFAULT_DB_PATH: &str = "./data/goal-reflect.db";

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Goal bank TOML file. The embedded bank is used when unset.
    pub goal_bank_path: Option<PathBuf>,
    pub llm: LlmConfig,
    /// Seed the demo students on startup.
    pub seed_demo: bool,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = var("GOAL_REFLECT_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();
        let goal_bank_path = var("GOAL_REFLECT_GOAL_BANK").map(PathBuf::from);

        let backend: LlmBackend = match var("GOAL_REFLECT_LLM_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::OpenAi,
        };
        let (key_var, default_model) = match backend {
            LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o-mini"),
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-3-5-haiku-latest"),
        };
        let api_key = var(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;
        let model = var("GOAL_REFLECT_MODEL").unwrap_or_else(|| default_model.to_string());

        let seed_demo = match var("GOAL_REFLECT_SEED_DEMO") {
            Some(raw) => parse_flag("GOAL_REFLECT_SEED_DEMO", &raw)?,
            None => false,
        };

        Ok(Self {
            db_path,
            goal_bank_path,
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            seed_demo,
        })
    }

    /// Load the configured goal bank, or the embedded one.
    pub fn load_goal_bank(&self) -> Result<GoalBank, ConfigError> {
        match &self.goal_bank_path {
            Some(path) => GoalBank::load(path),
            None => GoalBank::builtin(),
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
