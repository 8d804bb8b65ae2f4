/// Configuration for one model invocation against an OpenAI-compatible API.
///
/// The same struct describes both chat and embedding models; sampling fields
/// are simply ignored by the embeddings endpoint.
#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    /// Model identifier string (e.g., `"gpt-3.5-turbo-16k"`).
    pub model: String,

    /// Base URL without the `/v1/...` path (e.g., `https://api.openai.com`).
    pub endpoint: String,

    /// API key for bearer authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Penalty for tokens already present in the text so far.
    pub presence_penalty: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}
