//! Unified error handling for `ai-llm-service`.
//!
//! This module exposes a single top-level error type [`AiLlmError`] for the whole
//! library, and groups domain-specific errors in nested enums ([`ConfigError`],
//! [`ProviderError`]). Small helpers for reading/validating environment variables are
//! provided and return the unified [`Result<T>`] alias.
//!
//! All messages include the suffix `[AI LLM Service]` to simplify attribution in logs.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::llm_provider::LlmProvider;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, AiLlmError>;

/// Maximum number of characters kept from an upstream error body.
const SNIPPET_MAX_CHARS: usize = 300;

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `ai-llm-service` crate.
///
/// Single-attempt failures (`Provider`, `HttpTransport`, `Timeout`) are what the
/// retry loop classifies. Once the loop gives up it wraps the last one in
/// [`AiLlmError::Unavailable`]; an external cancellation surfaces as
/// [`AiLlmError::Cancelled`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Configuration/validation errors (startup).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Upstream provider answered, but not with something usable.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying HTTP transport error (connect, DNS, reset, body read).
    #[error("[AI LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// A single attempt exceeded the configured timeout.
    #[error("[AI LLM Service] operation timed out after {0:?}")]
    Timeout(Duration),

    /// Retries exhausted, or the first failure was not worth retrying.
    #[error("[AI LLM Service] model unavailable after {attempts} attempt(s): {last}")]
    Unavailable {
        attempts: u32,
        #[source]
        last: Box<AiLlmError>,
    },

    /// The caller's deadline fired while a request or backoff was in flight.
    #[error("[AI LLM Service] request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl AiLlmError {
    /// Whether a single-attempt failure is worth another try.
    ///
    /// Transient: HTTP 429, HTTP 5xx, timeouts and transport-level failures.
    /// Everything else (other 4xx, decode errors, config) fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            AiLlmError::Timeout(_) => true,
            AiLlmError::HttpTransport(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            AiLlmError::Provider(p) => match &p.kind {
                ProviderErrorKind::HttpStatus(h) => {
                    h.status == StatusCode::TOO_MANY_REQUESTS || h.status.is_server_error()
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Server-provided `Retry-After` hint, when the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::HttpStatus(h),
                ..
            }) => h.retry_after,
            _ => None,
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
///
/// Keep this focused: only errors that realistically happen at config
/// load/validation time.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[AI LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like limits or timeouts).
    #[error("[AI LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g., `INPUT_MAX_TOKENS`).
        var: &'static str,
        /// Human-readable reason (e.g., `expected u32`).
        reason: &'static str,
    },

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[AI LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        /// Variable name (e.g., `OPENROUTER_BASE_URL`).
        var: &'static str,
        /// Explanation (e.g., `must start with http:// or https://`).
        reason: &'static str,
    },

    /// A numeric field was outside of the allowed range.
    #[error("[AI LLM Service] {field} is out of range: {detail}")]
    OutOfRange {
        /// Field name (e.g., `max_tokens`).
        field: &'static str,
        /// Description of the expected range.
        detail: &'static str,
    },

    /// Model name was empty or invalid.
    #[error("[AI LLM Service] model name must not be empty")]
    EmptyModel,
}

/* ------------------------------------------------------------------------- */
/* Provider errors                                                           */
/* ------------------------------------------------------------------------- */

/// Error raised while talking to a concrete provider.
#[derive(Debug, Error)]
#[error("[AI LLM Service] {provider:?}: {kind}")]
pub struct ProviderError {
    pub provider: LlmProvider,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: LlmProvider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

/// What went wrong at the provider boundary.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// No API key configured for a provider that needs one.
    #[error("missing API key")]
    MissingApiKey,

    /// The endpoint is empty or does not start with http/https.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Upstream returned a non-successful HTTP status.
    #[error("{0}")]
    HttpStatus(HttpError),

    /// Response payload could not be decoded as expected.
    #[error("decode error: {0}")]
    Decode(String),

    /// A 2xx response with an empty `choices` array.
    #[error("response contained no choices")]
    EmptyChoices,
}

/// Non-2xx HTTP response details.
#[derive(Debug, Error)]
#[error("HTTP {status} from {url}: {snippet}")]
pub struct HttpError {
    /// Numeric HTTP status code.
    pub status: StatusCode,
    /// Request URL.
    pub url: String,
    /// Short snippet of the response body (trimmed).
    pub snippet: String,
    /// Parsed `Retry-After` header, if any.
    pub retry_after: Option<Duration>,
}

/// Trims an upstream body to a single-line, bounded snippet for logs and errors.
pub fn make_snippet(body: &str) -> String {
    let flat: String = body
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if flat.chars().count() <= SNIPPET_MAX_CHARS {
        return flat;
    }
    flat.chars().take(SNIPPET_MAX_CHARS).collect::<String>() + "…"
}

/* ------------------------------------------------------------------------- */
/* Env helpers (return unified `Result<T>`)                                  */
/* ------------------------------------------------------------------------- */

/// Trims a raw value; blank counts as unset.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Requires a non-empty value for `name`.
///
/// # Errors
/// Returns [`AiLlmError::Config`] with [`ConfigError::MissingVar`] if the
/// value is absent or blank.
pub fn require(name: &'static str, value: Option<String>) -> Result<String> {
    non_empty(value).ok_or_else(|| ConfigError::MissingVar(name).into())
}

/// Parses an optional `u32` (`Ok(None)` if unset/blank).
///
/// # Errors
/// Returns [`AiLlmError::Config`] with [`ConfigError::InvalidNumber`] if the
/// value is set but not a valid `u32`.
pub fn parse_opt_u32(name: &'static str, value: Option<String>) -> Result<Option<u32>> {
    match non_empty(value) {
        Some(v) => v.parse::<u32>().map(Some).map_err(|_| {
            AiLlmError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u32",
            })
        }),
        None => Ok(None),
    }
}

/// Parses an optional `u64` (`Ok(None)` if unset/blank).
pub fn parse_opt_u64(name: &'static str, value: Option<String>) -> Result<Option<u64>> {
    match non_empty(value) {
        Some(v) => v.parse::<u64>().map(Some).map_err(|_| {
            AiLlmError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u64",
            })
        }),
        None => Ok(None),
    }
}

/// Reads an optional, non-empty environment variable.
pub fn env_opt(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

/* ------------------------------------------------------------------------- */
/* Validation helpers (return unified `Result<T>`)                           */
/* ------------------------------------------------------------------------- */

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`AiLlmError::Config`] with [`ConfigError::InvalidFormat`] when
/// the string does not start with a valid HTTP scheme.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

/// Validates that a floating-point value lies within an inclusive range.
///
/// # Errors
/// Returns [`AiLlmError::Config`] with [`ConfigError::OutOfRange`] if `value`
/// is outside `[min, max]`.
pub fn validate_range_f32(field: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            detail: "expected value in inclusive range",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(code: u16) -> AiLlmError {
        ProviderError::new(
            LlmProvider::OpenRouter,
            ProviderErrorKind::HttpStatus(HttpError {
                status: StatusCode::from_u16(code).unwrap(),
                url: "http://x/chat/completions".into(),
                snippet: String::new(),
                retry_after: None,
            }),
        )
        .into()
    }

    #[test]
    fn transient_statuses_are_429_and_5xx() {
        assert!(status_error(429).is_transient());
        assert!(status_error(500).is_transient());
        assert!(status_error(503).is_transient());
        assert!(!status_error(400).is_transient());
        assert!(!status_error(401).is_transient());
        assert!(!status_error(404).is_transient());
        assert!(!status_error(422).is_transient());
    }

    #[test]
    fn timeouts_are_transient_and_decode_errors_are_not() {
        assert!(AiLlmError::Timeout(Duration::from_secs(30)).is_transient());
        let decode: AiLlmError = ProviderError::new(
            LlmProvider::OpenRouter,
            ProviderErrorKind::Decode("bad json".into()),
        )
        .into();
        assert!(!decode.is_transient());
    }

    #[test]
    fn snippet_is_flattened_and_bounded() {
        assert_eq!(make_snippet("  a\n\n b\tc "), "a b c");
        let long = "x".repeat(1_000);
        let s = make_snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_MAX_CHARS + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn number_parsing_treats_blank_as_unset() {
        assert_eq!(parse_opt_u32("N", None).unwrap(), None);
        assert_eq!(parse_opt_u32("N", Some("  ".into())).unwrap(), None);
        assert_eq!(parse_opt_u32("N", Some(" 42 ".into())).unwrap(), Some(42));
        assert!(matches!(
            parse_opt_u64("N", Some("ten".into())),
            Err(AiLlmError::Config(ConfigError::InvalidNumber { var: "N", .. }))
        ));
        assert!(matches!(
            require("KEY", Some(" ".into())),
            Err(AiLlmError::Config(ConfigError::MissingVar("KEY")))
        ));
    }

    #[test]
    fn temperature_range_is_inclusive() {
        assert!(validate_range_f32("temperature", 0.0, 0.0, 2.0).is_ok());
        assert!(validate_range_f32("temperature", 2.0, 0.0, 2.0).is_ok());
        assert!(validate_range_f32("temperature", 2.5, 0.0, 2.0).is_err());
        assert!(validate_range_f32("temperature", f32::NAN, 0.0, 2.0).is_err());
    }

    #[test]
    fn endpoint_validation_requires_http_scheme() {
        assert!(validate_http_endpoint("X", "https://openrouter.ai/api/v1").is_ok());
        assert!(validate_http_endpoint("X", "ftp://nope").is_err());
    }
}
