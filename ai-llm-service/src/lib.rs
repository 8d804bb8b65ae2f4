//! Provider glue for OpenAI-compatible APIs: env-driven model configs,
//! streamed chat completions, batched embeddings, unified errors and a
//! crate-scoped tracing layer.

pub mod config;
pub mod error_handler;
pub mod services;
pub mod telemetry;

pub use config::default_config::{
    config_openai_completion, config_openai_completion_from_lookup, config_openai_embedding,
    config_openai_embedding_from_lookup,
};
pub use config::llm_model_config::LlmModelConfig;
pub use error_handler::{AiLlmError, ProviderError, ProviderErrorKind};
pub use services::open_ai_service::{
    ChatDelta, ChatMessage, ChatOptions, ChatStream, EmbeddingsOutput, OpenAiService,
};
