//! Configuration for a Novelist run.
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! then `NOVELIST__`-prefixed environment variables
//! (`NOVELIST__RUN__NUM_IDEAS=3`). Command-line overrides are applied by the
//! caller afterwards. The API credential is never stored here, only the name
//! of the environment variable holding it.

use novelist_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration, snapshotted into every new run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelistConfig {
    /// Completion endpoint settings
    pub llm: LlmConfig,
    /// Retry policy shared by every completion call
    pub retry: RetryConfig,
    /// Local request limits
    pub rate_limit: RateLimitConfig,
    /// Orchestration settings
    pub run: RunConfig,
    /// Prompt template overrides
    pub prompts: PromptOverrides,
}

impl NovelistConfig {
    /// Loads configuration from an optional TOML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration fails validation.
    #[tracing::instrument(skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("NOVELIST")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to read configuration: {}", e)))?;
        let loaded: NovelistConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        loaded.validate()?;
        tracing::debug!(
            model = %loaded.llm.model,
            num_ideas = loaded.run.num_ideas,
            max_iterations = loaded.run.max_iterations,
            "Configuration loaded"
        );
        Ok(loaded)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.num_ideas == 0 {
            return Err(ConfigError::new("run.num_ideas must be at least 1"));
        }
        if self.run.max_iterations == 0 {
            return Err(ConfigError::new("run.max_iterations must be at least 1"));
        }
        if self.run.idea_reflections == 0 {
            return Err(ConfigError::new("run.idea_reflections must be at least 1"));
        }
        if self.run.workers == 0 {
            return Err(ConfigError::new("run.workers must be at least 1"));
        }
        if self.run.select_top_k == Some(0) {
            return Err(ConfigError::new("run.select_top_k must be at least 1"));
        }
        if self.run.done_marker.trim().is_empty() {
            return Err(ConfigError::new("run.done_marker must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::new("retry.max_attempts must be at least 1"));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::new(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms",
            ));
        }
        if self.llm.max_prompt_chars == 0 {
            return Err(ConfigError::new("llm.max_prompt_chars must be at least 1"));
        }
        if self.rate_limit.max_concurrent == Some(0) {
            return Err(ConfigError::new("rate_limit.max_concurrent must be at least 1"));
        }
        Ok(())
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat completions URL of an OpenAI-compatible endpoint
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Maximum output tokens per call
    pub max_output_tokens: u32,
    /// Default sampling temperature
    pub temperature: f32,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Upper bound on prompt length in characters
    pub max_prompt_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "NOVELIST_API_KEY".to_string(),
            max_output_tokens: 4096,
            temperature: 0.7,
            request_timeout_secs: 300,
            max_prompt_chars: 200_000,
        }
    }
}

impl LlmConfig {
    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Capped exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Cap on any single delay
    pub max_backoff_ms: u64,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before the first retry.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Cap on any single delay.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Local request limits, applied before each completion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute
    pub requests_per_minute: Option<u32>,
    /// Concurrent in-flight requests
    pub max_concurrent: Option<u32>,
}

impl RateLimitConfig {
    /// No limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// True when neither limit is set.
    pub fn is_unlimited(&self) -> bool {
        self.requests_per_minute.is_none() && self.max_concurrent.is_none()
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concepts to request
    pub num_ideas: u32,
    /// Number of concepts carried into refinement (defaults to `num_ideas`)
    pub select_top_k: Option<u32>,
    /// Extra generation rounds when fewer usable concepts came back
    pub extra_idea_rounds: u32,
    /// Passes per concept, including the first; above 1 the model is asked
    /// to improve each accepted concept until it repeats it with the done
    /// marker
    pub idea_reflections: u32,
    /// Regeneration attempts for malformed output
    pub validation_retries: u32,
    /// Maximum drafts per concept, including the first
    pub max_iterations: u32,
    /// Concepts refined concurrently
    pub workers: usize,
    /// Character budget for the condensed source
    pub condense_chars: usize,
    /// Ask the model for a source summary before generating ideas
    pub summarize_source: bool,
    /// Directory holding run state
    pub state_dir: PathBuf,
    /// Critique marker meaning "no further changes"
    pub done_marker: String,
    /// Temperature for idea generation
    pub idea_temperature: f32,
    /// Temperature for scoring
    pub evaluation_temperature: f32,
    /// Temperature for drafting, critique and revision
    pub drafting_temperature: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_ideas: 5,
            select_top_k: None,
            extra_idea_rounds: 3,
            idea_reflections: 1,
            validation_retries: 3,
            max_iterations: 3,
            workers: 2,
            condense_chars: 12_000,
            summarize_source: false,
            state_dir: PathBuf::from("runs"),
            done_marker: "NO_FURTHER_CHANGES".to_string(),
            idea_temperature: 0.9,
            evaluation_temperature: 0.2,
            drafting_temperature: 0.7,
        }
    }
}

impl RunConfig {
    /// Number of concepts to select, never above `num_ideas`.
    pub fn top_k(&self) -> usize {
        self.select_top_k
            .unwrap_or(self.num_ideas)
            .min(self.num_ideas) as usize
    }
}

/// Optional replacements for the built-in prompt templates.
///
/// Templates use `{placeholder}` substitution; see the pipeline crate for the
/// placeholders each template receives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    /// System prompt sent with every call
    pub system: Option<String>,
    /// Source summary request
    pub summary: Option<String>,
    /// Idea generation request
    pub ideas: Option<String>,
    /// Concept improvement request
    pub idea_reflection: Option<String>,
    /// Scoring rubric
    pub evaluation: Option<String>,
    /// First draft request
    pub draft: Option<String>,
    /// Critique request
    pub critique: Option<String>,
    /// Revision request
    pub revise: Option<String>,
}
