//! Default model configs loaded from environment variables.
//!
//! Two roles are supported:
//!
//! - **Completion** → chat model that answers questions over retrieved filings
//! - **Embedding**  → embedding generator for documents and questions
//!
//! Every constructor has a `*_from_lookup` variant that takes the variable
//! source as a closure, so callers and tests never have to mutate the process
//! environment.
//!
//! # Environment variables
//!
//! - `OPENAI_API_KEY`              = bearer key (mandatory)
//! - `OPENAI_BASE_URL`             = endpoint (default `https://api.openai.com`)
//! - `COMPLETION_MODEL`            = chat model (default `gpt-3.5-turbo-16k`)
//! - `EMBEDDING_MODEL`             = embedding model (default `text-embedding-ada-002`)
//! - `MAX_COMPLETION_TOKENS`       = output ceiling (default `1000`)
//! - `COMPLETION_TEMPERATURE`      = default `0.01`
//! - `COMPLETION_TOP_P`            = default `0.8`
//! - `COMPLETION_PRESENCE_PENALTY` = default `1.0`

use crate::{
    config::llm_model_config::LlmModelConfig,
    error_handler::{
        AiLlmError, ConfigError, lookup_non_empty, must_var, opt_f32, opt_u32,
        validate_http_endpoint, validate_range_f32,
    },
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-16k";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.01;
pub const DEFAULT_TOP_P: f32 = 0.8;
pub const DEFAULT_PRESENCE_PENALTY: f32 = 1.0;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolves the endpoint, falling back to the public OpenAI API.
///
/// # Errors
/// - [`ConfigError::InvalidFormat`] if `OPENAI_BASE_URL` has no http(s) scheme
fn openai_endpoint<F>(lookup: &F) -> Result<String, AiLlmError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = lookup_non_empty(lookup, "OPENAI_BASE_URL")
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    validate_http_endpoint("OPENAI_BASE_URL", &url)?;
    Ok(url.trim_end_matches('/').to_string())
}

/// Constructs the chat completion config from the process environment.
///
/// # Errors
/// See [`config_openai_completion_from_lookup`].
pub fn config_openai_completion() -> Result<LlmModelConfig, AiLlmError> {
    config_openai_completion_from_lookup(process_env)
}

/// Constructs the chat completion config from an arbitrary variable source.
///
/// # Defaults
/// - `temperature = 0.01`, `top_p = 0.8`, `presence_penalty = 1.0`
/// - `max_tokens = 1000`
/// - `timeout_secs = 600` (whole streamed response)
///
/// # Errors
/// - [`ConfigError::MissingVar`] if `OPENAI_API_KEY` is missing
/// - [`ConfigError::InvalidNumber`] / [`ConfigError::OutOfRange`] for bad sampling values
pub fn config_openai_completion_from_lookup<F>(lookup: F) -> Result<LlmModelConfig, AiLlmError>
where
    F: Fn(&str) -> Option<String>,
{
    let endpoint = openai_endpoint(&lookup)?;
    let api_key = must_var(&lookup, "OPENAI_API_KEY")?;
    let model = lookup_non_empty(&lookup, "COMPLETION_MODEL")
        .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());

    let max_tokens =
        opt_u32(&lookup, "MAX_COMPLETION_TOKENS")?.unwrap_or(DEFAULT_MAX_COMPLETION_TOKENS);
    if max_tokens == 0 {
        return Err(ConfigError::OutOfRange {
            field: "MAX_COMPLETION_TOKENS",
            detail: "expected at least 1",
        }
        .into());
    }

    let temperature = opt_f32(&lookup, "COMPLETION_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE);
    validate_range_f32("COMPLETION_TEMPERATURE", temperature, 0.0, 2.0)?;
    let top_p = opt_f32(&lookup, "COMPLETION_TOP_P")?.unwrap_or(DEFAULT_TOP_P);
    validate_range_f32("COMPLETION_TOP_P", top_p, 0.0, 1.0)?;
    let presence_penalty =
        opt_f32(&lookup, "COMPLETION_PRESENCE_PENALTY")?.unwrap_or(DEFAULT_PRESENCE_PENALTY);
    validate_range_f32("COMPLETION_PRESENCE_PENALTY", presence_penalty, -2.0, 2.0)?;

    Ok(LlmModelConfig {
        model,
        endpoint,
        api_key: Some(api_key),
        max_tokens: Some(max_tokens),
        temperature: Some(temperature),
        top_p: Some(top_p),
        presence_penalty: Some(presence_penalty),
        timeout_secs: Some(600),
    })
}

/// Constructs the embedding config from the process environment.
///
/// # Errors
/// See [`config_openai_embedding_from_lookup`].
pub fn config_openai_embedding() -> Result<LlmModelConfig, AiLlmError> {
    config_openai_embedding_from_lookup(process_env)
}

/// Constructs the embedding config from an arbitrary variable source.
///
/// # Defaults
/// - `timeout_secs = 60`
///
/// # Errors
/// - [`ConfigError::MissingVar`] if `OPENAI_API_KEY` is missing
pub fn config_openai_embedding_from_lookup<F>(lookup: F) -> Result<LlmModelConfig, AiLlmError>
where
    F: Fn(&str) -> Option<String>,
{
    let endpoint = openai_endpoint(&lookup)?;
    let api_key = must_var(&lookup, "OPENAI_API_KEY")?;
    let model = lookup_non_empty(&lookup, "EMBEDDING_MODEL")
        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

    Ok(LlmModelConfig {
        model,
        endpoint,
        api_key: Some(api_key),
        max_tokens: None,
        temperature: None,
        top_p: None,
        presence_penalty: None,
        timeout_secs: Some(60),
    })
}
