use std::str::FromStr;

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for chat completions.
///
/// Both variants speak the OpenAI chat-completions wire format; they differ in
/// default endpoint and in the attribution headers OpenRouter expects.
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::llm_provider::LlmProvider;
///
/// assert_eq!(
///     LlmProvider::OpenRouter.default_endpoint(),
///     "https://openrouter.ai/api/v1"
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenRouter gateway (default for the action).
    OpenRouter,
    /// OpenAI API or any OpenAI-compatible server.
    OpenAI,
}

impl LlmProvider {
    /// Base URL used when no endpoint override is configured.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LlmProvider::OpenAI => "https://api.openai.com/v1",
        }
    }

    /// Variable overriding [`Self::default_endpoint`].
    pub fn base_url_var(self) -> &'static str {
        match self {
            LlmProvider::OpenRouter => "OPENROUTER_BASE_URL",
            LlmProvider::OpenAI => "OPENAI_BASE_URL",
        }
    }

    /// Whether requests should carry `HTTP-Referer` / `X-Title` attribution headers.
    pub fn sends_attribution_headers(self) -> bool {
        matches!(self, LlmProvider::OpenRouter)
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    /// Parses `INPUT_LLM_PROVIDER` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(LlmProvider::OpenRouter),
            "openai" => Ok(LlmProvider::OpenAI),
            _ => Err(ConfigError::InvalidFormat {
                var: "INPUT_LLM_PROVIDER",
                reason: "expected openrouter or openai",
            }),
        }
    }
}
