//! Configuration management for SQL Answer.
//!
//! Configuration is read once at startup from environment variables:
//! - `LLM_API_KEY` - Required (falls back to `OPENROUTER_API_KEY`). Key for the LLM endpoint.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to OpenRouter.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `anthropic/claude-3-sonnet`.
//! - `LLM_TEMPERATURE` - Optional. Sampling temperature. Defaults to `0.2`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-call timeout. Defaults to `60`.
//! - `LLM_MAX_ATTEMPTS` - Optional. Attempts per reasoning call. Defaults to `1`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `5000`.
//! - `DB_DRIVER` - Optional. `postgres` or `sqlite`. Defaults to `postgres`.
//! - `DB_CONNECT_TIMEOUT_SECS` - Optional. Defaults to `10`.
//! - `DB_QUERY_TIMEOUT_SECS` - Optional. Defaults to `30`.
//! - `RESULT_ROW_LIMIT` - Optional. The `top_k` the prompt asks for. Defaults to `5`.
//! - `MAX_REASONING_STEPS` - Optional. Agent iteration ceiling. Defaults to `15`.
//! - `MAX_PARSE_RETRIES` - Optional. Malformed-step budget. Defaults to `3`.
//! - `LOOP_DEADLINE_SECS` - Optional. Wall-clock budget per question. Defaults to `180`.
//! - `MAX_RESULT_ROWS` - Optional. Hard row cap for executed queries. Defaults to `50`.
//! - `MAX_OBSERVATION_CHARS` - Optional. Observation size bound. Defaults to `4000`.
//! - `SAMPLE_ROWS` - Optional. Sample rows shown per described table. Defaults to `3`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::db::Driver;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// LLM endpoint configuration.
#[derive(Clone)]
pub struct LlmConfig {
    /// API key for the chat-completions endpoint
    pub api_key: String,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature (kept low to minimize creativity)
    pub temperature: f32,

    /// Hard timeout for a single completion call
    pub timeout: Duration,

    /// Attempts per reasoning call before the loop gives up
    pub max_attempts: usize,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Database driver configuration. Credentials are per request, not here.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Fixed driver used for every request
    pub driver: Driver,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Per-statement timeout
    pub query_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: Driver::Postgres,
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Limits for the agent loop and its tools.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Rows the prompt tells the model to limit results to (`top_k`)
    pub result_row_limit: usize,

    /// Maximum number of tool steps before the loop aborts
    pub max_reasoning_steps: usize,

    /// Malformed or unknown-tool steps tolerated before the loop aborts
    pub max_parse_retries: usize,

    /// Wall-clock budget for one loop run
    pub loop_deadline: Duration,

    /// Hard row cap enforced by `execute_query`
    pub max_result_rows: usize,

    /// Observations are truncated to this many bytes
    pub max_observation_chars: usize,

    /// Sample rows shown by `describe_table`
    pub sample_rows: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            result_row_limit: 5,
            max_reasoning_steps: 15,
            max_parse_retries: 3,
            loop_deadline: Duration::from_secs(180),
            max_result_rows: 50,
            max_observation_chars: 4000,
            sample_rows: 3,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// LLM endpoint
    pub llm: LlmConfig,

    /// Database driver settings
    pub database: DatabaseConfig,

    /// Agent loop limits
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::MissingEnvVar` if no LLM API key is set, and
    /// `LoadError::InvalidValue` for any variable that fails to parse.
    pub fn from_env() -> Result<Self, LoadError> {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| LoadError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let llm = LlmConfig {
            api_key,
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            model: std::env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "anthropic/claude-3-sonnet".to_string()),
            temperature: env_parse("LLM_TEMPERATURE", 0.2)?,
            timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", 60)?),
            max_attempts: env_parse::<usize>("LLM_MAX_ATTEMPTS", 1)?.max(1),
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 5000)?;

        let database = DatabaseConfig {
            driver: env_parse("DB_DRIVER", Driver::Postgres)?,
            connect_timeout: Duration::from_secs(env_parse("DB_CONNECT_TIMEOUT_SECS", 10)?),
            query_timeout: Duration::from_secs(env_parse("DB_QUERY_TIMEOUT_SECS", 30)?),
        };

        let defaults = AgentConfig::default();
        let agent = AgentConfig {
            result_row_limit: env_parse("RESULT_ROW_LIMIT", defaults.result_row_limit)?,
            max_reasoning_steps: env_parse("MAX_REASONING_STEPS", defaults.max_reasoning_steps)?,
            max_parse_retries: env_parse("MAX_PARSE_RETRIES", defaults.max_parse_retries)?,
            loop_deadline: Duration::from_secs(env_parse(
                "LOOP_DEADLINE_SECS",
                defaults.loop_deadline.as_secs(),
            )?),
            max_result_rows: env_parse("MAX_RESULT_ROWS", defaults.max_result_rows)?,
            max_observation_chars: env_parse(
                "MAX_OBSERVATION_CHARS",
                defaults.max_observation_chars,
            )?,
            sample_rows: env_parse("SAMPLE_ROWS", defaults.sample_rows)?,
        };

        if agent.result_row_limit == 0 {
            return Err(LoadError::InvalidValue(
                "RESULT_ROW_LIMIT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if agent.max_reasoning_steps == 0 {
            return Err(LoadError::InvalidValue(
                "MAX_REASONING_STEPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            llm,
            database,
            agent,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String, driver: Driver) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            llm: LlmConfig {
                api_key,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model,
                temperature: 0.2,
                timeout: Duration::from_secs(60),
                max_attempts: 1,
            },
            database: DatabaseConfig {
                driver,
                ..DatabaseConfig::default()
            },
            agent: AgentConfig::default(),
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, LoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| LoadError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
