//! Step 3: prompt → model → parse.
//!
//! Flow:
//!   1) Validate the request (at least one report, positive token ceiling);
//!   2) Build one bounded prompt covering every report (oldest dropped first);
//!   3) Optional prompt dump (redacted) for debugging;
//!   4) `complete()` with retries/timeout/cancellation from `ai-llm-service`;
//!   5) Lenient parse into an [`AnalysisResult`] (never fails), tagged with the failed jobs.
//!
//! Logs:
//! - `INFO`: one summary line (reports, prompt size, steps, degraded, timing)
//! - `DEBUG`: prompt budget details.

pub mod error_context;
pub mod prompt;
pub mod redact;
pub mod util;

use std::time::Instant;

use ai_llm_service::{CancellationToken, OpenAiService};
use tracing::{debug, info, warn};

use crate::errors::{ConfigError, Error, RescueResult};
use crate::git_providers::{FailedJob, FailureReport};
use crate::parser::{AnalysisResult, parse_response};
use crate::telemetry::prompt_dump;

/// Everything one model call needs. Built once per run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub reports: Vec<FailureReport>,
    pub model_id: String,
    pub max_tokens: u32,
}

impl AnalysisRequest {
    /// # Errors
    /// - [`Error::EmptyInput`] when `reports` is empty
    /// - [`Error::Config`] when `max_tokens` is zero
    pub fn new(
        reports: Vec<FailureReport>,
        model_id: impl Into<String>,
        max_tokens: u32,
    ) -> RescueResult<Self> {
        if reports.is_empty() {
            return Err(Error::EmptyInput);
        }
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                var: "INPUT_MAX_TOKENS",
                reason: "must be greater than zero".into(),
            }
            .into());
        }
        Ok(Self {
            reports,
            model_id: model_id.into(),
            max_tokens,
        })
    }
}

/// Runs prompt → model → parse for an already validated request.
///
/// # Errors
/// [`Error::ModelUnavailable`] when the model call ultimately fails or the
/// deadline fires mid-call.
pub async fn analyze(
    req: &AnalysisRequest,
    model: &OpenAiService,
    cancel: &CancellationToken,
) -> RescueResult<AnalysisResult> {
    let t0 = Instant::now();
    let prompt = prompt::build_prompt(&req.reports, req.max_tokens)?;
    debug!(
        "step3: prompt built chars={} budget={} reports={}",
        prompt.chars().count(),
        prompt::char_budget(req.max_tokens),
        req.reports.len()
    );
    prompt_dump::dump_prompt(&req.model_id, &prompt);

    let raw = model
        .complete(&prompt, Some(req.max_tokens), cancel)
        .await
        .map_err(Error::ModelUnavailable)?;

    let mut analysis = parse_response(&raw);
    analysis.failed_jobs = req.reports.iter().map(FailedJob::from).collect();
    if analysis.degraded {
        warn!(
            "step3: model reply did not follow the expected format (len={}), using degraded summary",
            raw.len()
        );
    }
    info!(
        "step3: analysis ready model={} reports={} steps={} code={} annotations={} degraded={} ({} ms)",
        req.model_id,
        req.reports.len(),
        analysis.fix_steps.len(),
        analysis.code_suggestion.is_some(),
        analysis.annotations.len(),
        analysis.degraded,
        t0.elapsed().as_millis()
    );
    Ok(analysis)
}

/// Convenience wrapper: validates `reports` against the model's own config and analyzes them.
pub async fn analyze_reports(
    reports: &[FailureReport],
    model: &OpenAiService,
    cancel: &CancellationToken,
) -> RescueResult<AnalysisResult> {
    let cfg = model.config();
    let max_tokens = cfg
        .max_tokens
        .unwrap_or(ai_llm_service::config::default_config::DEFAULT_MAX_TOKENS);
    let req = AnalysisRequest::new(reports.to_vec(), cfg.model.clone(), max_tokens)?;
    analyze(&req, model, cancel).await
}
