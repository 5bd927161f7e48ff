//! OpenAI-compatible chat-completion service (OpenRouter by default).
//!
//! Minimal, non-streaming client around the chat-completions REST API.
//! The endpoint is derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/chat/completions: chat completion (non-streaming)
//!
//! Constructor validation:
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//! - `cfg.model` must not be empty
//! - `cfg.temperature`, when set, must lie in `[0, 2]`
//!
//! Every call to [`OpenAiService::complete`] runs under the bounded retry state
//! machine from [`crate::retry`], with a per-attempt timeout. No state is kept
//! between calls apart from the pooled HTTP client.

use std::time::Instant;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::llm_model_config::LlmModelConfig,
    error_handler::{
        AiLlmError, ConfigError, HttpError, ProviderError, ProviderErrorKind, make_snippet,
        validate_range_f32,
    },
    retry::{parse_retry_after, run_with_retry},
};

/// Attribution headers OpenRouter uses for its app rankings.
const REFERER: &str = "https://github.com/ci-rescue-action";
const APP_TITLE: &str = "CI Rescue";

/// Thin client for an OpenAI-compatible chat-completions API.
///
/// Constructed from a complete [`LlmModelConfig`]. Internally keeps a
/// preconfigured `reqwest::Client` (with default headers).
#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// Validates the API key, model and endpoint scheme. Builds an HTTP
    /// client with default headers.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `MissingApiKey` if `cfg.api_key` is `None`
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::Config`] with `EmptyModel` if `cfg.model` is blank
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        // 1) API key must be present.
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::new(cfg.provider, ProviderErrorKind::MissingApiKey))?;

        // 2) Endpoint must use http/https.
        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                cfg.provider,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        // 3) Model must be named.
        if cfg.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        if let Some(t) = cfg.temperature {
            validate_range_f32("temperature", t, 0.0, 2.0)?;
        }

        // 4) HTTP client: default headers. Timeout is applied per attempt.
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                ProviderError::new(
                    cfg.provider,
                    ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                )
            })?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if cfg.provider.sends_attribution_headers() {
            headers.insert(header::REFERER, header::HeaderValue::from_static(REFERER));
            headers.insert("X-Title", header::HeaderValue::from_static(APP_TITLE));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(cfg.timeout())
            .default_headers(headers)
            .build()?;

        let base = endpoint.trim_end_matches('/').to_string();
        let url_chat = format!("{}/chat/completions", base);

        info!(
            provider = ?cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = cfg.timeout().as_secs(),
            max_retries = cfg.retry.max_retries,
            "OpenAiService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    /// Model configuration this service was built with.
    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// `complete(prompt) → rawText` with retries, timeout and cancellation.
    ///
    /// `max_tokens` overrides the configured ceiling when given.
    ///
    /// # Errors
    /// - [`AiLlmError::Unavailable`] when retries are exhausted or the failure is not transient
    /// - [`AiLlmError::Cancelled`] when `cancel` fires mid-request or mid-backoff
    pub async fn complete(
        &self,
        prompt: &str,
        max_tokens: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let text = run_with_retry(&self.cfg.retry, cancel, |attempt| {
            self.generate_once(prompt, max_tokens, attempt)
        })
        .await?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis() as u64,
            response_len = text.len(),
            "chat completion completed"
        );
        Ok(text)
    }

    /// One attempt: POST, status check, decode. Bounded by the per-attempt timeout.
    async fn generate_once(
        &self,
        prompt: &str,
        max_tokens: Option<u32>,
        attempt: u32,
    ) -> Result<String, AiLlmError> {
        let timeout = self.cfg.timeout();
        match tokio::time::timeout(timeout, self.post_chat(prompt, max_tokens, attempt)).await {
            Ok(res) => res,
            Err(_) => {
                error!(
                    attempt,
                    model = %self.cfg.model,
                    timeout_secs = timeout.as_secs(),
                    "chat completion attempt timed out"
                );
                Err(AiLlmError::Timeout(timeout))
            }
        }
    }

    async fn post_chat(
        &self,
        prompt: &str,
        max_tokens: Option<u32>,
        attempt: u32,
    ) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, prompt, max_tokens);

        debug!(
            attempt,
            model = %self.cfg.model,
            prompt_len = prompt.len(),
            max_tokens = ?body.max_tokens,
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let url = self.url_chat.clone();
            let retry_after = parse_retry_after(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);

            error!(
                attempt,
                %status,
                %url,
                %snippet,
                model = %self.cfg.model,
                latency_ms = started.elapsed().as_millis() as u64,
                "chat completion returned non-success status"
            );

            return Err(ProviderError::new(
                self.cfg.provider,
                ProviderErrorKind::HttpStatus(HttpError {
                    status,
                    url,
                    snippet,
                    retry_after,
                }),
            )
            .into());
        }

        let out: ChatCompletionResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    attempt,
                    error = %e,
                    model = %self.cfg.model,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "failed to decode chat completion response"
                );
                return Err(ProviderError::new(
                    self.cfg.provider,
                    ProviderErrorKind::Decode(format!(
                        "serde error: {e}; expected `choices[0].message.content`"
                    )),
                )
                .into());
            }
        };

        let first = out
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::new(self.cfg.provider, ProviderErrorKind::EmptyChoices))?;

        // A null/empty content is a valid (if useless) answer; the parser turns it
        // into the "analysis unavailable" result.
        Ok(first.message.content.unwrap_or_default())
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

/// Minimal request body for `/chat/completions` (non-streaming).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Builds a single-user-message request from config and `prompt`.
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str, max_tokens: Option<u32>) -> Self {
        Self {
            model: &cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: max_tokens.or(cfg.max_tokens),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Minimal response for `/chat/completions`.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}
