//! Deterministic Markdown rendering of the managed comment region.
//!
//! Identical analyses render to byte-identical bodies, which is what lets the
//! publisher skip no-op writes.

use crate::git_providers::FailedJob;
use crate::parser::{AnalysisResult, Annotation, AnnotationLevel};

/// Hidden start marker; never rendered by GitHub.
pub const COMMENT_MARKER: &str = "<!-- CI-RESCUE-COMMENT -->";
/// Hidden end marker closing the managed region.
pub const COMMENT_END_MARKER: &str = "<!-- CI-RESCUE-COMMENT:END -->";
/// First visible line of every managed comment.
pub const COMMENT_HEADER: &str = "🚨 **CI Failure Analysis**";

/// Renders the marker-delimited region for `analysis`.
///
/// Model-derived text goes through [`neutralize`], so the only comment
/// openers in the region are the two markers.
pub fn render_managed_region(analysis: &AnalysisResult) -> String {
    let mut s = String::new();
    s.push_str(COMMENT_MARKER);
    s.push('\n');
    s.push_str(COMMENT_HEADER);
    s.push_str("\n\n### Summary\n");
    s.push_str(&neutralize(analysis.summary.trim()));
    s.push('\n');

    if !analysis.fix_steps.is_empty() {
        s.push_str("\n### Suggested fix\n");
        for (i, step) in analysis.fix_steps.iter().enumerate() {
            s.push_str(&format!("{}. {}\n", i + 1, neutralize(step.trim())));
        }
    }

    if let Some(code) = analysis.code_suggestion.as_deref() {
        let fence = if code.contains("```") { "````" } else { "```" };
        s.push_str("\n### Code suggestion\n");
        s.push_str(fence);
        s.push_str(&neutralize(analysis.code_language.as_deref().unwrap_or("")));
        s.push('\n');
        s.push_str(&neutralize(code));
        s.push('\n');
        s.push_str(fence);
        s.push('\n');
    }

    if !analysis.annotations.is_empty() {
        s.push_str("\n### Code annotations\n");
        for a in &analysis.annotations {
            s.push_str(&render_annotation(a));
            s.push('\n');
        }
    }

    if analysis.failed_jobs.len() > 1 {
        s.push_str("\n### Failed jobs\n");
        for job in &analysis.failed_jobs {
            s.push_str(&render_failed_job(job));
            s.push('\n');
        }
    }

    s.push('\n');
    s.push_str(COMMENT_END_MARKER);
    s
}

/// Escapes HTML comment openers so foreign text can never fake a marker.
pub fn neutralize(text: &str) -> String {
    text.replace("<!--", "&lt;!--")
}

fn render_annotation(a: &Annotation) -> String {
    let emoji = match a.level() {
        AnnotationLevel::Failure => "❌",
        AnnotationLevel::Warning => "⚠️",
        AnnotationLevel::Notice => "ℹ️",
    };
    let lines = match a.end_line {
        Some(end) if end > a.start_line => format!("Lines {}-{}", a.start_line, end),
        _ => format!("Line {}", a.start_line),
    };
    format!(
        "- {} `{}` {}: {}",
        emoji,
        neutralize(a.path.trim()),
        lines,
        neutralize(&a.message.trim().replace('\n', " "))
    )
}

fn render_failed_job(job: &FailedJob) -> String {
    format!(
        "- **{}** → {} ({})",
        neutralize(job.job_name.trim()),
        neutralize(job.step_name.as_deref().unwrap_or("unknown step")),
        job.status
    )
}
