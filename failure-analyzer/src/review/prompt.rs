//! Prompt builder for step 3: one bounded prompt for all failed jobs.
//!
//! Budget policy:
//! 1) character budget = `max_tokens × 4`, clamped to [`MIN_PROMPT_CHARS`, `MAX_PROMPT_CHARS`];
//!    the response-format instructions are reserved out of it and never cut;
//! 2) each report gets an equal share of the rest, capped at [`LOG_TAIL_CHARS`]
//!    (error excerpt first, then log lines after the last error block);
//! 3) reports that do not fit even at [`MIN_EVIDENCE_CHARS`] are dropped from
//!    the front (oldest first);
//! 4) still too long → shrink the per-report evidence further;
//! 5) hard cut of the evidence as the last resort, so `len(prompt) ≤ budget` always holds.

use crate::errors::{Error, RescueResult};
use crate::git_providers::FailureReport;
use crate::review::error_context::extract_error_context;
use crate::review::redact::redact_secrets;
use crate::review::util::{head_chars, tail_chars};

pub const CHARS_PER_TOKEN: usize = 4;
pub const MIN_PROMPT_CHARS: usize = 2_000;
pub const MAX_PROMPT_CHARS: usize = 48_000;

/// Upper bound of evidence per report (excerpt plus trailing log lines).
pub const LOG_TAIL_CHARS: usize = 1_500;

/// Smallest evidence share worth sending; below it, older reports are dropped.
pub const MIN_EVIDENCE_CHARS: usize = 300;

/// Room kept for the intro paragraph and the omission notice.
const INTRO_CHARS: usize = 300;
/// Room kept per report for its header lines and section headings.
const REPORT_HEADER_CHARS: usize = 200;

/// Delimiter around the optional annotations JSON block.
pub const ANNOTATIONS_DELIMITER: &str = "<<<CI-RESCUE-ANNOTATIONS>>>";

/// Character budget derived from the completion ceiling.
pub fn char_budget(max_tokens: u32) -> usize {
    (max_tokens as usize)
        .saturating_mul(CHARS_PER_TOKEN)
        .clamp(MIN_PROMPT_CHARS, MAX_PROMPT_CHARS)
}

/// Builds the analysis prompt for `reports` (in collection order).
///
/// # Errors
/// [`Error::EmptyInput`] when `reports` is empty: the model is never called
/// without evidence.
pub fn build_prompt(reports: &[FailureReport], max_tokens: u32) -> RescueResult<String> {
    if reports.is_empty() {
        return Err(Error::EmptyInput);
    }
    let budget = char_budget(max_tokens).saturating_sub(INSTRUCTIONS.chars().count());

    let mut first = 0usize;
    while reports.len() - first > 1
        && assemble(reports, first, MIN_EVIDENCE_CHARS).chars().count() > budget
    {
        first += 1;
    }

    let mut limit = evidence_share(budget, reports.len() - first);
    let mut evidence = assemble(reports, first, limit);
    while limit > 0 {
        let len = evidence.chars().count();
        if len <= budget {
            break;
        }
        limit = limit.saturating_sub(len - budget);
        evidence = assemble(reports, first, limit);
    }

    if evidence.chars().count() > budget {
        evidence = head_chars(&evidence, budget).to_string();
    }
    evidence.push_str(INSTRUCTIONS);
    Ok(evidence)
}

/// Equal per-report share of `budget`, within [`MIN_EVIDENCE_CHARS`, `LOG_TAIL_CHARS`].
fn evidence_share(budget: usize, shown: usize) -> usize {
    (budget.saturating_sub(INTRO_CHARS) / shown.max(1))
        .saturating_sub(REPORT_HEADER_CHARS)
        .clamp(MIN_EVIDENCE_CHARS, LOG_TAIL_CHARS)
}

fn assemble(reports: &[FailureReport], first: usize, limit: usize) -> String {
    let shown = &reports[first..];
    let mut s = String::new();
    s.push_str(
        "You are an expert CI/CD assistant. Analyze the GitHub Actions workflow failure below \
         and write one concise, actionable diagnosis for the pull request.\n",
    );
    if reports.len() > 1 {
        s.push_str(&format!(
            "{} jobs failed in this run. Cover all of them in one combined summary and one fix-step list.\n",
            reports.len()
        ));
    }
    if first > 0 {
        s.push_str(&format!(
            "\n_{} earlier failure report(s) omitted to fit the prompt budget._\n",
            first
        ));
    }

    for (i, r) in shown.iter().enumerate() {
        s.push_str(&render_report(first + i + 1, reports.len(), r, limit));
    }
    s
}

/// One report; its excerpt and trailing lines together stay within `limit` chars.
fn render_report(idx: usize, total: usize, r: &FailureReport, limit: usize) -> String {
    let log = redact_secrets(&r.log_excerpt);
    let ctx = extract_error_context(&log);
    let details = tail_chars(&ctx.excerpt, limit);
    let rest = limit - details.chars().count();

    let mut s = String::new();
    s.push_str(&format!("\n## Failure {} of {}\n", idx, total));
    s.push_str(&format!("- Job: {}\n", r.job_name));
    s.push_str(&format!(
        "- Step: {}\n",
        r.step_name.as_deref().unwrap_or("unknown")
    ));
    s.push_str(&format!("- Status: {}\n", r.status));
    s.push_str("\n**Error details:**\n");
    s.push_str(details);
    s.push('\n');
    let after = tail_chars(&ctx.after, rest);
    if !after.trim().is_empty() {
        s.push_str("\n**Log output after the last error:**\n```text\n");
        s.push_str(after);
        s.push_str("\n```\n");
    }
    s
}

const INSTRUCTIONS: &str = "
## Response format
Answer with these labeled sections:
SUMMARY: one or two sentences naming the root cause (syntax error, missing dependency, test failure, lint issue, ...).
FIX STEPS:
1. first concrete action
2. next action
CODE SUGGESTION: optional; one fenced code block with the code change or shell command.

Be specific about file names, line numbers and exact error messages found in the logs.

If the failure points at specific files, append annotations as JSON between two delimiter lines:
<<<CI-RESCUE-ANNOTATIONS>>>
{\"annotations\":[{\"path\":\"path/to/file.py\",\"start_line\":42,\"end_line\":42,\"annotation_level\":\"failure\",\"message\":\"why this line fails\"}]}
<<<CI-RESCUE-ANNOTATIONS>>>
";
