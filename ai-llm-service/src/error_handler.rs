//! Unified error handling for `ai-llm-service`.
//!
//! This module exposes a single top-level error type [`AiLlmError`] for the whole
//! library, and groups domain-specific errors in nested types ([`ConfigError`],
//! [`ProviderError`]). Small helpers for reading/validating configuration values
//! are provided and return the unified [`Result<T>`] alias.
//!
//! All messages include the prefix `[AI LLM Service]` to simplify attribution in logs.

use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, AiLlmError>;

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `ai-llm-service` crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Configuration/validation errors (startup).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Upstream provider answered, but not with what we expected.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying HTTP transport error (e.g., `reqwest::Error`).
    #[error("[AI LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[AI LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like limits, timeouts, sampling values).
    #[error("[AI LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[AI LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },

    /// A numeric field was outside of the allowed range.
    #[error("[AI LLM Service] {field} is out of range: {detail}")]
    OutOfRange {
        field: &'static str,
        detail: &'static str,
    },

    /// Model name was empty.
    #[error("[AI LLM Service] model name must not be empty")]
    EmptyModel,
}

/* ------------------------------------------------------------------------- */
/* Provider errors                                                           */
/* ------------------------------------------------------------------------- */

/// Which upstream produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => f.write_str("openai"),
        }
    }
}

/// Non-2xx HTTP response details.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub url: String,
    /// Short, trimmed part of the response body.
    pub snippet: String,
}

/// What went wrong talking to a provider.
#[non_exhaustive]
#[derive(Debug)]
pub enum ProviderErrorKind {
    MissingApiKey,
    InvalidEndpoint(String),
    HttpStatus(HttpError),
    Decode(String),
    /// The response stream broke after it was opened.
    StreamInterrupted(String),
}

/// Provider-attributed error.
#[derive(Debug, Error)]
#[error("[AI LLM Service] {provider}: {kind}")]
pub struct ProviderError {
    pub provider: Provider,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: Provider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }

    /// HTTP status if the provider rejected the request.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            ProviderErrorKind::HttpStatus(h) => Some(h.status),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::MissingApiKey => f.write_str("missing API key"),
            ProviderErrorKind::InvalidEndpoint(e) => write!(f, "invalid endpoint: {e}"),
            ProviderErrorKind::HttpStatus(h) => {
                write!(f, "HTTP {} from {}: {}", h.status, h.url, h.snippet)
            }
            ProviderErrorKind::Decode(m) => write!(f, "decode error: {m}"),
            ProviderErrorKind::StreamInterrupted(m) => write!(f, "stream interrupted: {m}"),
        }
    }
}

/// Maximum number of characters kept from an error body.
const SNIPPET_MAX_CHARS: usize = 300;

/// Trims a response body to a short single-line snippet for logs and errors.
pub fn make_snippet(body: &str) -> String {
    let flat: String = body
        .trim()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= SNIPPET_MAX_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SNIPPET_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

/* ------------------------------------------------------------------------- */
/* Lookup helpers (return unified `Result<T>`)                               */
/* ------------------------------------------------------------------------- */

/// Reads a non-empty, trimmed value through `lookup`.
pub fn lookup_non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fetches a required, non-empty variable.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_var<F>(lookup: &F, name: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup_non_empty(lookup, name).ok_or_else(|| ConfigError::MissingVar(name).into())
}

/// Parses an optional `u32` (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not a valid `u32`.
pub fn opt_u32<F>(lookup: &F, name: &'static str) -> Result<Option<u32>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup_non_empty(lookup, name) {
        Some(v) => v.parse::<u32>().map(Some).map_err(|_| {
            AiLlmError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u32",
            })
        }),
        None => Ok(None),
    }
}

/// Parses an optional `f32` (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not a number.
pub fn opt_f32<F>(lookup: &F, name: &'static str) -> Result<Option<f32>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup_non_empty(lookup, name) {
        Some(v) => v.parse::<f32>().map(Some).map_err(|_| {
            AiLlmError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected a number",
            })
        }),
        None => Ok(None),
    }
}

/* ------------------------------------------------------------------------- */
/* Validation helpers                                                        */
/* ------------------------------------------------------------------------- */

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`ConfigError::InvalidFormat`] when the scheme is missing.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

/// Validates that a floating-point value lies within an inclusive range.
///
/// # Errors
/// Returns [`ConfigError::OutOfRange`] if `value` is outside `[min, max]`.
pub fn validate_range_f32(field: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            detail: "expected value in inclusive range",
        }
        .into())
    }
}
