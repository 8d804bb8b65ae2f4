//! Completion driver: stream an answer, retry truncated ones with a smaller prompt.
//!
//! Attempt `n` (0-based) assembles the prompt with `failures = n`, so the
//! context budget halves and the brevity directive appears after the first
//! cut-off answer. Only a `"stop"` finish reason counts as an answer; when the
//! attempts run out the driver returns `Ok(None)`.
//!
//! Opening the stream has its own transport retry budget. Errors after the
//! first fragment are never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ai_llm_service::ChatOptions;
use futures::StreamExt;
use services::retry::{RetryPolicy, retry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ContextorError;
use crate::llm::{ChatCompletion, DeltaStream};
use crate::prompt::PromptAssembler;

/// Finish reason of a naturally completed answer.
pub const FINISH_STOP: &str = "stop";

/// Knobs for [`CompletionDriver`].
#[derive(Clone, Debug)]
pub struct DriverOptions {
    /// Truncation retries, first attempt included.
    pub max_attempts: u32,
    /// Retry policy for opening the stream.
    pub transport_retry: RetryPolicy,
    /// Deadline for one attempt, from opening the stream (transport retries
    /// included) to the last fragment.
    pub stream_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transport_retry: RetryPolicy::no_retry(),
            stream_timeout: Duration::from_secs(300),
        }
    }
}

pub struct CompletionDriver {
    chat: Arc<dyn ChatCompletion>,
    assembler: PromptAssembler,
    params: ChatOptions,
    opts: DriverOptions,
}

struct Streamed {
    text: String,
    finish_reason: Option<String>,
}

impl CompletionDriver {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        assembler: PromptAssembler,
        params: ChatOptions,
        opts: DriverOptions,
    ) -> Self {
        Self {
            chat,
            assembler,
            params,
            opts,
        }
    }

    /// Answers `question` from `items` (rendered documents, best first).
    ///
    /// `on_fragment` sees every streamed fragment of every attempt, including
    /// attempts that end up truncated.
    ///
    /// # Errors
    /// - provider errors from inside the stream
    /// - the provider error if the stream cannot be opened, wrapped in
    ///   [`ContextorError::TooManyRetries`] when transport retries are enabled
    /// - [`ContextorError::StreamTimeout`] / [`ContextorError::Cancelled`]
    pub async fn answer<S, F>(
        &self,
        question: &str,
        items: &[S],
        mut on_fragment: F,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ContextorError>
    where
        S: AsRef<str>,
        F: FnMut(&str),
    {
        let max_attempts = self.opts.max_attempts.max(1);

        for failures in 0..max_attempts {
            let assembled = self.assembler.assemble(question, items, failures);
            let started = Instant::now();

            let attempt = tokio::time::timeout(
                self.opts.stream_timeout,
                self.attempt(&assembled.prompt, &mut on_fragment),
            );
            let streamed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("completion cancelled by caller");
                    return Err(ContextorError::Cancelled);
                }
                res = attempt => match res {
                    Ok(res) => res?,
                    Err(_) => {
                        return Err(ContextorError::StreamTimeout {
                            secs: self.opts.stream_timeout.as_secs(),
                        });
                    }
                },
            };

            info!(
                attempt = failures + 1,
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = streamed.text.len(),
                finish_reason = ?streamed.finish_reason,
                "full response received"
            );

            if streamed.finish_reason.as_deref() == Some(FINISH_STOP) {
                return Ok(Some(streamed.text.trim().to_string()));
            }

            warn!(
                finish_reason = streamed.finish_reason.as_deref().unwrap_or("none"),
                "answer was cut off"
            );
            warn!(truncated = %streamed.text.trim(), "truncated answer");
            if failures + 1 < max_attempts {
                warn!("trying again with a shorter prompt");
            }
        }

        warn!(attempts = max_attempts, "no complete answer within the attempt budget");
        Ok(None)
    }

    /// Opens the stream under the transport policy and reads it to the end.
    async fn attempt<F>(&self, prompt: &str, on_fragment: &mut F) -> Result<Streamed, ContextorError>
    where
        F: FnMut(&str),
    {
        let mut stream: DeltaStream = retry("open completion stream", &self.opts.transport_retry, || {
            self.chat.stream(prompt, &self.params)
        })
        .await
        .map_err(|e| {
            if self.opts.transport_retry.max_attempts <= 1 {
                e.into_last()
            } else {
                ContextorError::from(e)
            }
        })?;

        let mut out = Streamed {
            text: String::new(),
            finish_reason: None,
        };
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            if let Some(content) = delta.content {
                on_fragment(&content);
                out.text.push_str(&content);
            }
            if delta.finish_reason.is_some() {
                out.finish_reason = delta.finish_reason;
            }
        }
        Ok(out)
    }
}
