//! Provider-agnostic data model for failed jobs and pull-request comments.
//!
//! These types are the "normalized output" of step 1 and are consumed by the
//! prompt builder (reports) and the comment reconciler (existing comments).

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a job that counts as a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Failed,
    Cancelled,
    TimedOut,
}

impl JobStatus {
    /// Maps a GitHub job `conclusion`; successful/skipped/neutral jobs map to `None`.
    pub fn from_conclusion(conclusion: &str) -> Option<Self> {
        match conclusion {
            "failure" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            "timed_out" => Some(JobStatus::TimedOut),
            _ => None,
        }
    }

    /// GitHub's wording, which is also what the model sees.
    pub fn as_conclusion(self) -> &'static str {
        match self {
            JobStatus::Failed => "failure",
            JobStatus::Cancelled => "cancelled",
            JobStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_conclusion())
    }
}

/// Evidence collected for one failed job. Immutable once collected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureReport {
    pub job_name: String,
    pub status: JobStatus,
    /// Tail of the job log (already bounded by the collector).
    pub log_excerpt: String,
    /// First failed step, when the job reports steps.
    pub step_name: Option<String>,
}

/// Log-free identity of a failed job, carried into the rendered comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedJob {
    pub job_name: String,
    pub step_name: Option<String>,
    pub status: JobStatus,
}

impl From<&FailureReport> for FailedJob {
    fn from(r: &FailureReport) -> Self {
        Self {
            job_name: r.job_name.clone(),
            step_name: r.step_name.clone(),
            status: r.status,
        }
    }
}

/// A comment already present on the pull request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExistingComment {
    pub id: u64,
    pub body: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Workflow event coordinates used to find the pull request of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    /// `GITHUB_EVENT_NAME`, e.g. `pull_request` or `workflow_run`.
    pub name: Option<String>,
    /// `GITHUB_EVENT_PATH`: JSON payload of the triggering event.
    pub path: Option<PathBuf>,
    /// `GITHUB_SHA`: commit the run was triggered for.
    pub sha: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failing_conclusions_produce_a_status() {
        assert_eq!(JobStatus::from_conclusion("failure"), Some(JobStatus::Failed));
        assert_eq!(JobStatus::from_conclusion("timed_out"), Some(JobStatus::TimedOut));
        assert_eq!(JobStatus::from_conclusion("success"), None);
        assert_eq!(JobStatus::from_conclusion("skipped"), None);
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
    }
}
