use crate::config::llm_provider::LlmProvider;
use crate::retry::RetryPolicy;

/// Default per-attempt timeout for a chat completion.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for an LLM model invocation.
///
/// Built once per run and never mutated afterwards.
///
/// # Fields
///
/// - `provider`: Which backend to use (OpenRouter or an OpenAI-compatible API).
/// - `model`: The model identifier (e.g., `"openai/gpt-4o-mini"`).
/// - `endpoint`: API base including the version segment (e.g., `https://openrouter.ai/api/v1`).
/// - `api_key`: Bearer credential.
/// - `max_tokens`: Completion token ceiling.
/// - `temperature`: Sampling temperature; the analysis prompt wants near-deterministic output.
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Per-attempt request timeout in seconds.
/// - `retry`: Retry/backoff policy for transient failures.
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
/// use ai_llm_service::retry::RetryPolicy;
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::OpenRouter,
///     model: "openai/gpt-4o-mini".to_string(),
///     endpoint: "https://openrouter.ai/api/v1".to_string(),
///     api_key: Some("sk-or-...".to_string()),
///     max_tokens: Some(1000),
///     temperature: Some(0.1),
///     top_p: None,
///     timeout_secs: Some(30),
///     retry: RetryPolicy::default(),
/// };
/// assert_eq!(cfg.timeout().as_secs(), 30);
/// ```
#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// API base URL (without the `/chat/completions` suffix).
    pub endpoint: String,

    /// API key for bearer authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional per-attempt request timeout (in seconds).
    pub timeout_secs: Option<u64>,

    /// Retry policy applied around each completion.
    pub retry: RetryPolicy,
}

impl LlmModelConfig {
    /// Effective per-attempt timeout.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}
