//! Crate-wide error hierarchy for failure-analyzer.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - The three fatal pipeline failures (`EmptyInput`, `ModelUnavailable`,
//!   `CommentWrite`) are distinct variants so the binary can report them.
//! - Provider-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use ai_llm_service::AiLlmError;
use reqwest::StatusCode;
use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type RescueResult<T> = Result<T, Error>;

/// Root error type for the failure-analyzer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No failed-job evidence was collected; nothing to analyze.
    #[error("no failure evidence: the workflow run has no failed, cancelled or timed-out jobs")]
    EmptyInput,

    /// The model endpoint could not produce a completion (retries exhausted,
    /// non-transient failure, or the run deadline fired mid-request).
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] AiLlmError),

    /// Creating or editing the pull-request comment failed. Never retried.
    #[error("comment write failed: {0}")]
    CommentWrite(#[source] ProviderError),

    /// GitHub read-side failure (jobs, pull requests, comment listing).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration problems (missing inputs, bad numbers, unknown mode).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run deadline fired outside the model stage.
    #[error("run cancelled before completion")]
    Cancelled,
}

/// Detailed GitHub REST error used inside the provider layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ProviderError {
    /// Maps a non-success HTTP status to a provider error.
    pub fn from_status(status: StatusCode, retry_after_secs: Option<u64>) -> Self {
        let code = status.as_u16();
        match code {
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            404 => ProviderError::NotFound,
            429 => ProviderError::RateLimited { retry_after_secs },
            500..=599 => ProviderError::Server(code),
            _ => ProviderError::HttpStatus(code),
        }
    }
}

/// Configuration and setup errors (missing inputs, malformed values).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required input: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),

    /// Model-side configuration rejected by `ai-llm-service`.
    #[error(transparent)]
    Model(#[from] ai_llm_service::error_handler::ConfigError),
}

impl ConfigError {
    /// Keeps model-side config errors typed; anything else is reported as an invalid value.
    pub fn from_llm(e: AiLlmError) -> Self {
        match e {
            AiLlmError::Config(c) => ConfigError::Model(c),
            other => ConfigError::InvalidValue {
                var: "model configuration",
                reason: other.to_string(),
            },
        }
    }
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(ProviderError::from(e))
    }
}

impl From<AiLlmError> for Error {
    fn from(e: AiLlmError) -> Self {
        match e {
            AiLlmError::Config(c) => Error::Config(ConfigError::Model(c)),
            other => Error::ModelUnavailable(other),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            return ProviderError::from_status(status, None);
        }
        ProviderError::Network(e.to_string())
    }
}

/* ---- GitHub Actions workflow commands ---- */

/// Formats an `::error` workflow command so a fatal error shows up in the job summary.
///
/// `%`, `\r` and `\n` are escaped as the runner expects; the title also escapes
/// `:` and `,` because it is a command property.
pub fn workflow_error_command(title: &str, message: &str) -> String {
    fn escape_data(s: &str) -> String {
        s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
    }
    let title = escape_data(title).replace(':', "%3A").replace(',', "%2C");
    format!("::error title={}::{}", title, escape_data(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_provider_taxonomy() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::UNAUTHORIZED, None),
            ProviderError::Unauthorized
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, Some(7)),
            ProviderError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, None),
            ProviderError::Server(502)
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::UNPROCESSABLE_ENTITY, None),
            ProviderError::HttpStatus(422)
        ));
    }

    #[test]
    fn model_config_errors_stay_config_errors() {
        let e: Error = AiLlmError::from(ai_llm_service::error_handler::ConfigError::EmptyModel).into();
        assert!(matches!(e, Error::Config(ConfigError::Model(_))));

        let e: Error = AiLlmError::Cancelled { attempts: 1 }.into();
        assert!(matches!(e, Error::ModelUnavailable(_)));
    }

    #[test]
    fn workflow_command_escapes_newlines_and_percent() {
        let line = workflow_error_command("CI Rescue", "100% broken\nsecond line");
        assert_eq!(line, "::error title=CI Rescue::100%25 broken%0Asecond line");
    }
}
