//! Question answering over the filing index.
//!
//! [`QueryOrchestrator::answer`] embeds the question, retrieves the top-K
//! filings from the live alias, and hands them to the [`CompletionDriver`],
//! which fits as many as the token budget allows into the prompt and streams
//! the answer, shrinking the prompt when an answer gets cut off.

mod api_types;
mod cfg;
pub mod driver;
mod error;
pub mod llm;
mod progress;
pub mod prompt;
pub mod select;
pub mod tokenizer;

use std::sync::Arc;

pub use api_types::AskOutcome;
pub use cfg::ContextorConfig;
pub use driver::{CompletionDriver, DriverOptions};
pub use error::ContextorError;
pub use llm::{ChatCompletion, DeltaStream, OpenAiChat};
pub use progress::{IndicatifProgress, NoopProgress, Progress};
pub use prompt::{AssembledPrompt, PromptAssembler};
pub use tokenizer::{TiktokenCounter, TokenCounter};

use ai_llm_service::{OpenAiService, config_openai_completion, config_openai_embedding};
use rag_store::{EmbeddingsProvider, OpenAiEmbedder, RagConfig, RagHit, RagStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Documents logged at `info` for each question.
const LOGGED_TOP_DOCUMENTS: usize = 3;

/// Embed → retrieve → complete, for one question at a time.
pub struct QueryOrchestrator {
    rag: RagStore,
    embedder: Arc<dyn EmbeddingsProvider>,
    driver: CompletionDriver,
    progress: Arc<dyn Progress>,
}

impl QueryOrchestrator {
    pub fn new(rag: RagStore, embedder: Arc<dyn EmbeddingsProvider>, driver: CompletionDriver) -> Self {
        Self {
            rag,
            embedder,
            driver,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Wires Qdrant, the OpenAI embedder and the OpenAI chat model from
    /// environment variables.
    ///
    /// # Errors
    /// Returns `ContextorError` for missing/invalid configuration or a
    /// tokenizer that cannot be loaded.
    pub fn from_env() -> Result<Self, ContextorError> {
        let ccfg = ContextorConfig::from_env()?;
        let rag = RagStore::new(RagConfig::from_env()?)?;

        let embedder = OpenAiEmbedder::new(
            OpenAiService::new(config_openai_embedding()?)?,
            rag.config().embedding_dim,
        );

        let chat = OpenAiChat::new(OpenAiService::new(config_openai_completion()?)?);
        let counter = TiktokenCounter::for_model(chat.model())?;
        let params = chat.default_params();

        let driver = CompletionDriver::new(
            Arc::new(chat),
            PromptAssembler::new(Arc::new(counter), ccfg.input_token_goal),
            params,
            ccfg.driver_options(),
        );

        Ok(Self::new(rag, Arc::new(embedder), driver))
    }

    /// Answers `question`, passing each streamed fragment to `on_fragment`.
    ///
    /// No retries of its own: embedding and search errors propagate, and
    /// the driver decides about truncated answers.
    ///
    /// # Errors
    /// Propagates `ContextorError` from embedding, retrieval or completion.
    pub async fn answer<F>(
        &self,
        question: &str,
        on_fragment: F,
        cancel: &CancellationToken,
    ) -> Result<AskOutcome, ContextorError>
    where
        F: FnMut(&str),
    {
        info!(%question, "processing new question");

        self.progress.step("embedding question and retrieving filings");
        let hits = match self.rag.rag_context(self.embedder.as_ref(), question).await {
            Ok(hits) => hits,
            Err(e) => {
                self.progress.finish("retrieval failed");
                return Err(e.into());
            }
        };
        log_hits(&hits);

        let items: Vec<String> = hits.iter().map(|h| h.document.to_context_string()).collect();

        self.progress.finish("context ready");
        info!(documents = items.len(), "calling completion model");
        let answer = self.driver.answer(question, &items, on_fragment, cancel).await?;

        Ok(AskOutcome {
            answer,
            context_count: items.len(),
        })
    }

    /// Convenience wrapper over [`QueryOrchestrator::answer`] without
    /// streaming or cancellation.
    ///
    /// # Errors
    /// See [`QueryOrchestrator::answer`].
    pub async fn ask(&self, question: &str) -> Result<Option<String>, ContextorError> {
        let out = self
            .answer(question, |_| {}, &CancellationToken::new())
            .await?;
        Ok(out.answer)
    }
}

fn log_hits(hits: &[RagHit]) {
    info!(retrieved = hits.len(), "top relevant documents:");
    for hit in hits.iter().take(LOGGED_TOP_DOCUMENTS) {
        info!(score = hit.score, document = %hit.raw_payload, "relevant document");
    }
    debug!("all relevant documents:");
    for (rank, hit) in hits.iter().enumerate() {
        debug!(rank, score = hit.score, document = %hit.raw_payload, "record");
    }
}
