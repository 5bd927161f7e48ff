//! Default LLM config loaded strictly from environment variables.
//!
//! The action receives its inputs as `INPUT_*` variables (GitHub Actions
//! convention). This module turns the model-related ones into a validated
//! [`LlmModelConfig`].
//!
//! # Environment variables
//!
//! - `INPUT_OPENROUTER_API_KEY` = bearer key (mandatory, whatever the provider)
//! - `INPUT_LLM_PROVIDER`       = `openrouter` (default) or `openai`
//! - `INPUT_MODEL`              = model id (default `openai/gpt-4o-mini`)
//! - `INPUT_MAX_TOKENS`         = completion ceiling, `> 0` (default `1000`)
//! - `OPENROUTER_BASE_URL` / `OPENAI_BASE_URL` = API base override for the chosen provider
//! - `LLM_TIMEOUT_SECS`         = per-attempt timeout, `> 0` (default `30`)

use crate::{
    config::{
        llm_model_config::{DEFAULT_TIMEOUT_SECS, LlmModelConfig},
        llm_provider::LlmProvider,
    },
    error_handler::{
        AiLlmError, ConfigError, non_empty, parse_opt_u32, parse_opt_u64, require,
        validate_http_endpoint,
    },
    retry::RetryPolicy,
};

/// Model used when `INPUT_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Completion ceiling used when `INPUT_MAX_TOKENS` is not set.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Sampling temperature for failure analysis (low: we want focused answers).
pub const ANALYSIS_TEMPERATURE: f32 = 0.1;

/// Constructs the chat-completion config, reading variables through `get`
/// (`std::env::var` in production, a map in tests).
///
/// # Errors
///
/// - [`ConfigError::MissingVar`] if the API key is missing
/// - [`ConfigError::InvalidNumber`] if `INPUT_MAX_TOKENS` / `LLM_TIMEOUT_SECS` do not parse
/// - [`ConfigError::OutOfRange`] if `INPUT_MAX_TOKENS` or `LLM_TIMEOUT_SECS` is `0`
/// - [`ConfigError::InvalidFormat`] for an unknown provider or a non-http(s) base URL
pub fn config_from_lookup<F>(get: F) -> Result<LlmModelConfig, AiLlmError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = require("INPUT_OPENROUTER_API_KEY", get("INPUT_OPENROUTER_API_KEY"))?;
    let model = non_empty(get("INPUT_MODEL")).unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let max_tokens =
        parse_opt_u32("INPUT_MAX_TOKENS", get("INPUT_MAX_TOKENS"))?.unwrap_or(DEFAULT_MAX_TOKENS);
    if max_tokens == 0 {
        return Err(ConfigError::OutOfRange {
            field: "INPUT_MAX_TOKENS",
            detail: "must be greater than zero",
        }
        .into());
    }

    let provider = match non_empty(get("INPUT_LLM_PROVIDER")) {
        Some(name) => name.parse::<LlmProvider>()?,
        None => LlmProvider::OpenRouter,
    };
    let endpoint = non_empty(get(provider.base_url_var()))
        .unwrap_or_else(|| provider.default_endpoint().to_string());
    validate_http_endpoint(provider.base_url_var(), &endpoint)?;

    let timeout_secs =
        parse_opt_u64("LLM_TIMEOUT_SECS", get("LLM_TIMEOUT_SECS"))?.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::OutOfRange {
            field: "LLM_TIMEOUT_SECS",
            detail: "must be greater than zero",
        }
        .into());
    }

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key: Some(api_key),
        max_tokens: Some(max_tokens),
        temperature: Some(ANALYSIS_TEMPERATURE),
        top_p: None,
        timeout_secs: Some(timeout_secs),
        retry: RetryPolicy::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let cfg = config_from_lookup(lookup(&[("INPUT_OPENROUTER_API_KEY", "sk-test")])).unwrap();
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert_eq!(cfg.endpoint, "https://openrouter.ai/api/v1");
        assert_eq!(cfg.timeout_secs, Some(DEFAULT_TIMEOUT_SECS));
        assert_eq!(cfg.temperature, Some(ANALYSIS_TEMPERATURE));
    }

    #[test]
    fn missing_key_and_bad_numbers_are_config_errors() {
        assert!(matches!(
            config_from_lookup(lookup(&[])),
            Err(AiLlmError::Config(ConfigError::MissingVar("INPUT_OPENROUTER_API_KEY")))
        ));
        assert!(matches!(
            config_from_lookup(lookup(&[
                ("INPUT_OPENROUTER_API_KEY", "k"),
                ("INPUT_MAX_TOKENS", "lots"),
            ])),
            Err(AiLlmError::Config(ConfigError::InvalidNumber { .. }))
        ));
        assert!(matches!(
            config_from_lookup(lookup(&[
                ("INPUT_OPENROUTER_API_KEY", "k"),
                ("INPUT_MAX_TOKENS", "0"),
            ])),
            Err(AiLlmError::Config(ConfigError::OutOfRange { .. }))
        ));
        assert!(matches!(
            config_from_lookup(lookup(&[
                ("INPUT_OPENROUTER_API_KEY", "k"),
                ("OPENROUTER_BASE_URL", "openrouter.ai"),
            ])),
            Err(AiLlmError::Config(ConfigError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(matches!(
            config_from_lookup(lookup(&[
                ("INPUT_OPENROUTER_API_KEY", "k"),
                ("LLM_TIMEOUT_SECS", "0"),
            ])),
            Err(AiLlmError::Config(ConfigError::OutOfRange {
                field: "LLM_TIMEOUT_SECS",
                ..
            }))
        ));
    }

    #[test]
    fn openai_provider_uses_its_own_endpoint_and_override() {
        let cfg = config_from_lookup(lookup(&[
            ("INPUT_OPENROUTER_API_KEY", "k"),
            ("INPUT_LLM_PROVIDER", "openai"),
            ("OPENROUTER_BASE_URL", "http://ignored.example"),
        ]))
        .unwrap();
        assert_eq!(cfg.provider, LlmProvider::OpenAI);
        assert_eq!(cfg.endpoint, "https://api.openai.com/v1");

        let cfg = config_from_lookup(lookup(&[
            ("INPUT_OPENROUTER_API_KEY", "k"),
            ("INPUT_LLM_PROVIDER", "OpenAI"),
            ("OPENAI_BASE_URL", "http://localhost:9000/v1"),
        ]))
        .unwrap();
        assert_eq!(cfg.endpoint, "http://localhost:9000/v1");

        assert!(matches!(
            config_from_lookup(lookup(&[
                ("INPUT_OPENROUTER_API_KEY", "k"),
                ("INPUT_LLM_PROVIDER", "bedrock"),
            ])),
            Err(AiLlmError::Config(ConfigError::InvalidFormat {
                var: "INPUT_LLM_PROVIDER",
                ..
            }))
        ));
    }

    #[test]
    fn overrides_are_trimmed_and_applied() {
        let cfg = config_from_lookup(lookup(&[
            ("INPUT_OPENROUTER_API_KEY", " k "),
            ("INPUT_MODEL", " anthropic/claude-3-haiku "),
            ("INPUT_MAX_TOKENS", "2500"),
            ("OPENROUTER_BASE_URL", "http://localhost:8080/api/v1"),
            ("LLM_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("k"));
        assert_eq!(cfg.model, "anthropic/claude-3-haiku");
        assert_eq!(cfg.max_tokens, Some(2500));
        assert_eq!(cfg.endpoint, "http://localhost:8080/api/v1");
        assert_eq!(cfg.timeout_secs, Some(5));
    }
}
