//! Chat-completion client used by the CI failure analyzer.
//!
//! - [`config`]: model configuration, provider kinds, env-driven defaults
//! - [`services::open_ai_service::OpenAiService`]: `complete(prompt) → raw text`
//! - [`retry`]: bounded retry state machine (attempts, backoff, cancellation)
//! - [`telemetry`]: `tracing` subscriber setup shared by the binary

pub mod config;
pub mod error_handler;
pub mod retry;
pub mod services;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{AiLlmError, Result};
pub use retry::RetryPolicy;
pub use services::open_ai_service::OpenAiService;
pub use tokio_util::sync::CancellationToken;
