//! Public entry for the CI failure analyzer pipeline.
//!
//! One high-level function diagnoses a failed GitHub Actions run and keeps a
//! single managed comment on its pull request up to date.
//!
//! 1) **Step 1: Log Collector**
//!    - List the run's jobs; every failed, cancelled or timed-out job becomes a `FailureReport`
//!    - Fetch a bounded log tail per job (degrades to a note when logs are unavailable)
//!    - No evidence → `Error::EmptyInput`, before any other network call
//!
//! 2) **Step 2: Pull request resolution**
//!    - Event payload first, then open pull requests matched on the head SHA
//!    - No pull request → nothing to comment on, the run ends successfully
//!
//! 3) **Step 3: Analysis**
//!    - One bounded prompt for all reports (oldest dropped first, secrets redacted)
//!    - One chat completion with bounded retries (`ai-llm-service`)
//!    - Lenient parse into an `AnalysisResult` (never fails)
//!
//! 4) **Step 4: Reconcile**
//!    - Scan the PR comments for the hidden marker; earliest match is canonical
//!    - Pure decision: create / update / replace, plus the rendered body
//!
//! 5) **Step 5: Publish**
//!    - Single write, never retried; skipped when unchanged or in dry-run
//!
//! The pipeline uses `tracing` for logging and avoids `async-trait` and heap
//! trait objects. It relies on plain `async fn` over thin concrete clients.

pub mod config;
pub mod errors;
pub mod git_providers;
pub mod parser; // step 3 (response)
pub mod publish; // steps 4–5
pub mod review; // step 3 (prompt + model)
pub mod telemetry;

use std::time::Instant;

use ai_llm_service::{CancellationToken, OpenAiService};
use tracing::{debug, info, warn};

pub use config::RescueConfig;
pub use errors::{Error, RescueResult};
pub use git_providers::{FailedJob, FailureReport, GitHubClient, JobStatus};
pub use parser::{AnalysisResult, parse_response};
pub use publish::reconcile::{CommentAction, ReconcilePlan, reconcile};
pub use publish::{CommentMode, ManagedComment, PublishConfig, SkipReason};
pub use review::{AnalysisRequest, analyze, analyze_reports};

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescueOutcome {
    /// A comment was created, updated or replaced.
    Posted {
        action: CommentAction,
        comment_id: u64,
    },
    /// The managed comment already carried this exact body.
    Unchanged { comment_id: u64 },
    /// Dry-run: the action that would have been performed.
    DryRun { action: CommentAction },
    /// The run is not associated with a pull request.
    NoPullRequest,
}

/// Runs steps **1–5** for one workflow run.
///
/// # Errors
/// - [`Error::EmptyInput`] when the run has no failed jobs
/// - [`Error::ModelUnavailable`] when the model call ultimately fails (nothing is posted)
/// - [`Error::CommentWrite`] when the final create/edit fails
/// - [`Error::Cancelled`] when `cancel` fires outside the model call
/// - [`Error::Provider`] for GitHub read failures
pub async fn run_rescue(
    cfg: &RescueConfig,
    cancel: CancellationToken,
) -> RescueResult<RescueOutcome> {
    let t0 = Instant::now();
    let client = GitHubClient::from_config(&cfg.github)?;
    let model = OpenAiService::new(cfg.llm.clone())?;
    debug!(
        "init: repo={} run_id={} mode={} dry_run={} include_logs={}",
        client.repository(),
        cfg.run_id,
        cfg.comment_mode,
        cfg.dry_run,
        cfg.include_logs
    );

    // ---------------------------
    // Step 1: collect failures
    // ---------------------------
    ensure_live(&cancel, "collect")?;
    let reports = client.collect_failures(cfg.run_id, cfg.include_logs).await?;
    if reports.is_empty() {
        return Err(Error::EmptyInput);
    }

    // ---------------------------
    // Step 2: find the pull request
    // ---------------------------
    ensure_live(&cancel, "resolve")?;
    let Some(pr) = client.resolve_pull_request(&cfg.event).await? else {
        info!(
            "step2: run {} is not associated with a pull request, nothing to comment on",
            cfg.run_id
        );
        return Ok(RescueOutcome::NoPullRequest);
    };
    info!("step2: pull request #{}", pr);

    // ---------------------------
    // Step 3: prompt → model → parse
    // ---------------------------
    let analysis = analyze_reports(&reports, &model, &cancel).await?;

    // ---------------------------
    // Step 4: reconcile against the thread
    // ---------------------------
    ensure_live(&cancel, "reconcile")?;
    let existing = client.list_comments(pr).await?;
    let plan = reconcile(&existing, &analysis, cfg.comment_mode);
    debug!(
        "step4: existing={} action={} target={:?} unchanged={}",
        existing.len(),
        plan.action.as_str(),
        plan.target_id,
        plan.unchanged
    );

    // ---------------------------
    // Step 5: publish
    // ---------------------------
    ensure_live(&cancel, "publish")?;
    let published = publish::publish(
        &client,
        pr,
        &plan,
        cfg.comment_mode,
        PublishConfig {
            dry_run: cfg.dry_run,
        },
    )
    .await?;

    let outcome = match (published.skipped_reason, published.comment.id) {
        (None, Some(comment_id)) => RescueOutcome::Posted {
            action: published.action,
            comment_id,
        },
        (Some(SkipReason::Unchanged), Some(comment_id)) => RescueOutcome::Unchanged { comment_id },
        _ => RescueOutcome::DryRun {
            action: published.action,
        },
    };
    info!(
        "done: pr=#{} reports={} outcome={:?} in {} ms",
        pr,
        reports.len(),
        outcome,
        t0.elapsed().as_millis()
    );
    Ok(outcome)
}

fn ensure_live(cancel: &CancellationToken, stage: &str) -> RescueResult<()> {
    if cancel.is_cancelled() {
        warn!("deadline reached before {}, stopping", stage);
        return Err(Error::Cancelled);
    }
    Ok(())
}
