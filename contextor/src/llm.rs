//! Completion capability used by the driver, and its OpenAI adapter.

use std::pin::Pin;

use ai_llm_service::{ChatDelta, ChatMessage, ChatOptions, OpenAiService};
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::ContextorError;

/// Incremental completion output; ends after the fragment carrying the finish reason.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, ContextorError>> + Send>>;

/// Streaming chat completion for a single user message.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Opens the stream. Errors returned here happen before any fragment was
    /// produced and may be retried; errors inside the stream may not.
    async fn stream(&self, prompt: &str, params: &ChatOptions) -> Result<DeltaStream, ContextorError>;
}

/// [`ChatCompletion`] over the OpenAI chat completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiChat {
    svc: OpenAiService,
}

impl OpenAiChat {
    pub fn new(svc: OpenAiService) -> Self {
        Self { svc }
    }

    pub fn model(&self) -> &str {
        self.svc.model()
    }

    /// Sampling parameters from the service config.
    pub fn default_params(&self) -> ChatOptions {
        self.svc.default_options()
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn stream(&self, prompt: &str, params: &ChatOptions) -> Result<DeltaStream, ContextorError> {
        let messages = [ChatMessage::user(prompt)];
        let stream = self.svc.stream_chat(&messages, params).await?;
        Ok(Box::pin(stream.map(|item| item.map_err(ContextorError::from))))
    }
}
