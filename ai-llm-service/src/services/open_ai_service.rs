//! OpenAI service for streaming chat completions and embeddings.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1/chat/completions : chat completion (`stream: true`)
//! - POST {endpoint}/v1/embeddings : batched embeddings retrieval
//!
//! Constructor validation:
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//!
//! Errors are normalized via unified error types in `error_handler`.

use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, trace};

use crate::{
    config::llm_model_config::LlmModelConfig,
    error_handler::{
        AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
    },
};

/// Fragments buffered between the reader task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One incremental piece of a streamed chat completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatDelta {
    /// Text appended by this fragment, if any.
    pub content: Option<String>,
    /// Set on the final fragment (`"stop"`, `"length"`, ...).
    pub finish_reason: Option<String>,
}

/// Stream of deltas produced by [`OpenAiService::stream_chat`].
///
/// Dropping it closes the channel and stops the background reader.
pub type ChatStream = ReceiverStream<Result<ChatDelta, AiLlmError>>;

/// Chat message sent to the provider.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// One of: "system" | "user" | "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one request; `None` falls back to the service config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Vectors for a batch of inputs plus provider-reported token usage.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingsOutput {
    /// One vector per input, in input order.
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// Thin client for the OpenAI API.
///
/// Constructed from a complete [`LlmModelConfig`]. Internally keeps a
/// preconfigured `reqwest::Client` (with timeout and default headers).
///
/// High-level operations:
/// - [`OpenAiService::stream_chat`] : streamed chat completion
/// - [`OpenAiService::embeddings_batch`] : embeddings for many inputs
/// - [`OpenAiService::embeddings`] : single embeddings vector
#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `MissingApiKey` if `cfg.api_key` is `None`
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            ProviderError::new(Provider::OpenAI, ProviderErrorKind::MissingApiKey)
        })?;

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                Provider::OpenAI,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                ProviderError::new(
                    Provider::OpenAI,
                    ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                )
            })?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let base = endpoint.trim_end_matches('/').to_string();
        let url_chat = format!("{}/v1/chat/completions", base);
        let url_embeddings = format!("{}/v1/embeddings", base);

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = timeout.as_secs(),
            "OpenAiService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    /// Model identifier this service talks to.
    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// Config-derived default sampling options.
    pub fn default_options(&self) -> ChatOptions {
        ChatOptions {
            temperature: self.cfg.temperature,
            top_p: self.cfg.top_p,
            presence_penalty: self.cfg.presence_penalty,
            max_tokens: self.cfg.max_tokens,
        }
    }

    /// Opens a **streaming** chat completion (`stream: true`).
    ///
    /// Returns once the provider accepted the request; fragments are then
    /// read by a background task and delivered through the returned stream.
    /// A transport failure after this point arrives as an `Err` item with
    /// `StreamInterrupted`.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<ChatStream, AiLlmError> {
        let started = Instant::now();
        let defaults = self.default_options();
        let body = ChatCompletionRequest {
            model: &self.cfg.model,
            messages,
            stream: true,
            temperature: opts.temperature.or(defaults.temperature),
            top_p: opts.top_p.or(defaults.top_p),
            presence_penalty: opts.presence_penalty.or(defaults.presence_penalty),
            max_tokens: opts.max_tokens.or(defaults.max_tokens),
        };

        debug!(
            model = %self.cfg.model,
            messages = messages.len(),
            max_tokens = ?body.max_tokens,
            "POST {}", self.url_chat
        );

        let resp = self
            .client
            .post(&self.url_chat)
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.status_error(resp, &self.url_chat, started).await);
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let model = self.cfg.model.clone();

        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut fragments: usize = 0;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let err = ProviderError::new(
                            Provider::OpenAI,
                            ProviderErrorKind::StreamInterrupted(e.to_string()),
                        );
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                };

                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Delta(delta) => {
                            fragments += 1;
                            if tx.send(Ok(delta)).await.is_err() {
                                debug!(%model, fragments, "chat stream receiver dropped");
                                return;
                            }
                        }
                        SseEvent::Done => {
                            debug!(
                                %model,
                                fragments,
                                latency_ms = started.elapsed().as_millis(),
                                "chat stream finished"
                            );
                            return;
                        }
                    }
                }
            }

            debug!(%model, fragments, "chat stream closed without [DONE]");
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Retrieves embeddings for many inputs via one `/v1/embeddings` call.
    ///
    /// Vectors are returned in input order (the response is re-sorted by `index`).
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    ///   or the number of vectors does not match the number of inputs
    pub async fn embeddings_batch(&self, inputs: &[String]) -> Result<EmbeddingsOutput, AiLlmError> {
        if inputs.is_empty() {
            return Ok(EmbeddingsOutput::default());
        }

        let started = Instant::now();
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input: inputs,
        };

        debug!(
            model = %self.cfg.model,
            inputs = inputs.len(),
            "POST {}", self.url_embeddings
        );

        let resp = self
            .client
            .post(&self.url_embeddings)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.status_error(resp, &self.url_embeddings, started).await);
        }

        let out: EmbeddingsResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    error = %e,
                    model = %self.cfg.model,
                    latency_ms = started.elapsed().as_millis(),
                    "failed to decode /v1/embeddings response"
                );
                return Err(ProviderError::new(
                    Provider::OpenAI,
                    ProviderErrorKind::Decode(format!("serde error: {e}; expected `data[].embedding`")),
                )
                .into());
            }
        };

        let output = out.into_output(inputs.len())?;

        info!(
            model = %self.cfg.model,
            inputs = inputs.len(),
            total_tokens = output.total_tokens,
            latency_ms = started.elapsed().as_millis(),
            "embeddings completed"
        );

        Ok(output)
    }

    /// Retrieves a single embeddings vector.
    ///
    /// # Errors
    /// Same as [`OpenAiService::embeddings_batch`].
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let out = self.embeddings_batch(&[input.to_string()]).await?;
        out.vectors.into_iter().next().ok_or_else(|| {
            ProviderError::new(
                Provider::OpenAI,
                ProviderErrorKind::Decode("empty `data` in embeddings response".into()),
            )
            .into()
        })
    }

    async fn status_error(&self, resp: reqwest::Response, url: &str, started: Instant) -> AiLlmError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);

        error!(
            %status,
            %url,
            %snippet,
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "OpenAI returned non-success status"
        );

        ProviderError::new(
            Provider::OpenAI,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            }),
        )
        .into()
    }
}

/* ===========================================================================
Server-sent events
======================================================================== */

/// Parsed server-sent event relevant to chat streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(ChatDelta),
    Done,
}

/// Incremental `text/event-stream` line decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// characters split across network chunks are decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every complete event they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }

            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => {
                    if let Some(delta) = chunk.into_delta() {
                        events.push(SseEvent::Delta(delta));
                    }
                }
                Err(e) => trace!(error = %e, data, "ignoring unparseable SSE chunk"),
            }
        }

        events
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// One `data: {...}` payload of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl StreamChunk {
    fn into_delta(self) -> Option<ChatDelta> {
        let choice = self.choices.into_iter().next()?;
        let content = choice.delta.content.filter(|c| !c.is_empty());
        if content.is_none() && choice.finish_reason.is_none() {
            return None;
        }
        Some(ChatDelta {
            content,
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
    #[serde(default)]
    usage: Option<EmbeddingsUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsUsage {
    total_tokens: u64,
}

impl EmbeddingsResponse {
    fn into_output(mut self, expected: usize) -> Result<EmbeddingsOutput, AiLlmError> {
        if self.data.len() != expected {
            return Err(ProviderError::new(
                Provider::OpenAI,
                ProviderErrorKind::Decode(format!(
                    "expected {expected} embeddings, got {}",
                    self.data.len()
                )),
            )
            .into());
        }
        self.data.sort_by_key(|d| d.index);
        Ok(EmbeddingsOutput {
            vectors: self.data.into_iter().map(|d| d.embedding).collect(),
            total_tokens: self.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}
