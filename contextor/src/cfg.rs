//! Runtime configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use services::retry::RetryPolicy;

use crate::driver::DriverOptions;
use crate::error::ContextorError;

/// Prompt and completion knobs. All fields have defaults via `from_env`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextorConfig {
    /// Base input-token budget for the first attempt.
    pub input_token_goal: usize,
    /// Truncation retries, first attempt included.
    pub max_attempts: u32,
    /// Attempts to open a completion stream.
    pub transport_attempts: u32,
    /// Back-off after the first failed open; doubles afterwards.
    pub transport_initial_wait: Duration,
    /// Deadline for one streamed attempt.
    pub stream_timeout: Duration,
}

impl Default for ContextorConfig {
    fn default() -> Self {
        Self {
            input_token_goal: 14_900,
            max_attempts: 3,
            transport_attempts: 1,
            transport_initial_wait: Duration::from_secs(5),
            stream_timeout: Duration::from_secs(300),
        }
    }
}

impl ContextorConfig {
    pub fn from_env() -> Result<Self, ContextorError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// # Errors
    /// Returns [`ContextorError::Config`] on unparsable or zero values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContextorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let cfg = Self {
            input_token_goal: parse(&lookup, "INPUT_TOKEN_GOAL", d.input_token_goal)?,
            max_attempts: parse(&lookup, "COMPLETION_MAX_ATTEMPTS", d.max_attempts)?,
            transport_attempts: parse(&lookup, "COMPLETION_TRANSPORT_ATTEMPTS", d.transport_attempts)?,
            transport_initial_wait: Duration::from_secs(parse(
                &lookup,
                "RETRY_INITIAL_WAIT_SECS",
                d.transport_initial_wait.as_secs(),
            )?),
            stream_timeout: Duration::from_secs(parse(
                &lookup,
                "COMPLETION_STREAM_TIMEOUT_SECS",
                d.stream_timeout.as_secs(),
            )?),
        };

        if cfg.input_token_goal == 0 {
            return Err(ContextorError::Config("INPUT_TOKEN_GOAL must be > 0".into()));
        }
        if cfg.max_attempts == 0 || cfg.transport_attempts == 0 {
            return Err(ContextorError::Config("attempt counts must be > 0".into()));
        }
        Ok(cfg)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            max_attempts: self.max_attempts,
            transport_retry: RetryPolicy::new(self.transport_attempts, self.transport_initial_wait),
            stream_timeout: self.stream_timeout,
        }
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ContextorError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|_| ContextorError::Config(format!("{key}: cannot parse {v:?}"))),
        None => Ok(default),
    }
}
