//! GitHub provider (REST v3) for workflow jobs, logs, pull requests and comments.
//!
//! Endpoints used:
//! - GET   /repos/{repo}/actions/runs/{run_id}/jobs?per_page=100
//! - GET   /repos/{repo}/actions/jobs/{job_id}/logs        (302 → plain text)
//! - GET   /repos/{repo}/pulls?state=open&per_page=100&page=k
//! - GET   /repos/{repo}/issues/{number}/comments?per_page=100&page=k
//! - POST  /repos/{repo}/issues/{number}/comments
//! - PATCH /repos/{repo}/issues/comments/{comment_id}
//!
//! Reads degrade where a partial answer is still useful (a missing job log
//! becomes a one-line note). Writes are issued exactly once.

use std::time::Instant;

use ai_llm_service::error_handler::make_snippet;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::errors::{ProviderError, RescueResult};
use crate::git_providers::types::*;
use crate::git_providers::{ProviderConfig, build_http_client};
use crate::review::util::tail_chars;

/// Maximum number of log characters kept per job (tail).
pub const JOB_LOG_TAIL_CHARS: usize = 5_000;

/// Page size for list endpoints.
const PER_PAGE: usize = 100;

/// Upper bound on pages fetched for list endpoints.
const MAX_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // "https://api.github.com"
    repo: String,     // "owner/repo"
}

impl GitHubClient {
    /// Constructs a client with auth headers baked into the shared reqwest instance.
    pub fn from_config(cfg: &ProviderConfig) -> RescueResult<Self> {
        Ok(Self {
            http: build_http_client(&cfg.token)?,
            base_api: cfg.base_api.trim_end_matches('/').to_string(),
            repo: cfg.repository.clone(),
        })
    }

    /// "owner/repo" this client talks to.
    pub fn repository(&self) -> &str {
        &self.repo
    }

    /* ---- Log Collector ---- */

    /// Lists the jobs of a workflow run and turns every failed, cancelled or
    /// timed-out job into a [`FailureReport`].
    ///
    /// Logs are fetched only when `include_logs` is set; a failed log fetch
    /// degrades to a short note instead of failing the run.
    pub async fn collect_failures(
        &self,
        run_id: u64,
        include_logs: bool,
    ) -> RescueResult<Vec<FailureReport>> {
        let t0 = Instant::now();
        let url = format!(
            "{}/repos/{}/actions/runs/{}/jobs?per_page={}",
            self.base_api, self.repo, run_id, PER_PAGE
        );
        debug!("step1: GET {}", url);

        #[derive(Deserialize)]
        struct Step {
            name: String,
            #[serde(default)]
            conclusion: Option<String>,
        }
        #[derive(Deserialize)]
        struct Job {
            id: u64,
            name: String,
            #[serde(default)]
            conclusion: Option<String>,
            #[serde(default)]
            steps: Vec<Step>,
        }
        #[derive(Deserialize)]
        struct JobsResp {
            #[serde(default)]
            jobs: Vec<Job>,
        }

        let resp = ensure_success(self.http.get(&url).send().await?, "list jobs").await?;
        let jobs: JobsResp = read_json(resp).await?;
        let total = jobs.jobs.len();

        let mut reports = Vec::new();
        for job in jobs.jobs {
            let Some(status) = job.conclusion.as_deref().and_then(JobStatus::from_conclusion)
            else {
                continue;
            };
            let step_name = job
                .steps
                .iter()
                .find(|s| s.conclusion.as_deref() == Some("failure"))
                .map(|s| s.name.clone());
            let log_excerpt = if include_logs {
                self.job_logs(job.id).await
            } else {
                String::new()
            };
            debug!(
                "step1: failed job id={} name={} status={} step={:?} log_len={}",
                job.id,
                job.name,
                status,
                step_name,
                log_excerpt.len()
            );
            reports.push(FailureReport {
                job_name: job.name,
                status,
                log_excerpt,
                step_name,
            });
        }

        info!(
            "step1: jobs={} failed={} include_logs={} ({} ms)",
            total,
            reports.len(),
            include_logs,
            t0.elapsed().as_millis()
        );
        Ok(reports)
    }

    /// Tail of a job's log, or a one-line note when it cannot be fetched.
    pub async fn job_logs(&self, job_id: u64) -> String {
        let url = format!(
            "{}/repos/{}/actions/jobs/{}/logs",
            self.base_api, self.repo, job_id
        );
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => tail_chars(&text, JOB_LOG_TAIL_CHARS).to_string(),
                Err(e) => {
                    warn!("step1: job {} log body unreadable: {}", job_id, e);
                    format!("Error retrieving logs: {e}")
                }
            },
            Ok(resp) => {
                let status = resp.status().as_u16();
                warn!("step1: job {} logs unavailable (status {})", job_id, status);
                format!("Could not retrieve logs (status: {status})")
            }
            Err(e) => {
                warn!("step1: job {} logs request failed: {}", job_id, e);
                format!("Error retrieving logs: {e}")
            }
        }
    }

    /* ---- Pull request resolution ---- */

    /// Finds the pull request a run belongs to.
    ///
    /// 1) `pull_request`/`pull_request_target`/`workflow_run` payloads carry the number;
    /// 2) otherwise open pull requests are matched on `head.sha == GITHUB_SHA`.
    pub async fn resolve_pull_request(&self, event: &EventContext) -> RescueResult<Option<u64>> {
        if let Some(number) = pr_from_event_file(event).await {
            debug!("step2: PR #{} from event payload", number);
            return Ok(Some(number));
        }

        let Some(sha) = event.sha.as_deref().filter(|s| !s.is_empty()) else {
            debug!("step2: no event PR and no GITHUB_SHA → no pull request");
            return Ok(None);
        };

        #[derive(Deserialize)]
        struct Head {
            sha: String,
        }
        #[derive(Deserialize)]
        struct Pull {
            number: u64,
            head: Head,
        }

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/pulls?state=open&per_page={}&page={}",
                self.base_api, self.repo, PER_PAGE, page
            );
            debug!("step2: GET {}", url);
            let resp = ensure_success(self.http.get(&url).send().await?, "list pulls").await?;
            let pulls: Vec<Pull> = read_json(resp).await?;
            let count = pulls.len();
            if let Some(pr) = pulls.into_iter().find(|p| p.head.sha == sha) {
                debug!("step2: PR #{} matched head sha {}", pr.number, sha);
                return Ok(Some(pr.number));
            }
            if count < PER_PAGE {
                break;
            }
        }
        Ok(None)
    }

    /* ---- Comment surface ---- */

    /// All issue comments of a pull request (id, body, author, creation time).
    pub async fn list_comments(&self, number: u64) -> RescueResult<Vec<ExistingComment>> {
        #[derive(Deserialize)]
        struct User {
            login: String,
        }
        #[derive(Deserialize)]
        struct Comment {
            id: u64,
            #[serde(default)]
            body: Option<String>,
            #[serde(default)]
            user: Option<User>,
            #[serde(default)]
            created_at: Option<DateTime<Utc>>,
        }

        let mut out = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/issues/{}/comments?per_page={}&page={}",
                self.base_api, self.repo, number, PER_PAGE, page
            );
            debug!("step4: GET {}", url);
            let resp =
                ensure_success(self.http.get(&url).send().await?, "list comments").await?;
            let comments: Vec<Comment> = read_json(resp).await?;
            let count = comments.len();
            out.extend(comments.into_iter().map(|c| ExistingComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
                author: c.user.map(|u| u.login),
                created_at: c.created_at,
            }));
            if count < PER_PAGE {
                break;
            }
        }
        Ok(out)
    }

    /// Creates an issue comment on the pull request and returns its id.
    pub async fn create_comment(&self, number: u64, body: &str) -> Result<u64, ProviderError> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.base_api, self.repo, number
        );
        debug!("step5: POST {} body_len={}", url, body.len());
        self.write_comment(self.http.post(&url), body, "create comment")
            .await
    }

    /// Replaces the body of an existing issue comment and returns its id.
    pub async fn update_comment(&self, comment_id: u64, body: &str) -> Result<u64, ProviderError> {
        let url = format!(
            "{}/repos/{}/issues/comments/{}",
            self.base_api, self.repo, comment_id
        );
        debug!("step5: PATCH {} body_len={}", url, body.len());
        self.write_comment(self.http.patch(&url), body, "update comment")
            .await
    }

    async fn write_comment(
        &self,
        req: reqwest::RequestBuilder,
        body: &str,
        what: &str,
    ) -> Result<u64, ProviderError> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            body: &'a str,
        }
        #[derive(Deserialize)]
        struct CommentResp {
            id: u64,
        }

        let resp = ensure_success(req.json(&Req { body }).send().await?, what).await?;
        let created: CommentResp = read_json(resp).await?;
        Ok(created.id)
    }
}

/// Returns the response when 2xx, otherwise logs a snippet and maps the status.
async fn ensure_success(resp: Response, what: &str) -> Result<Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    error!(
        %status,
        %url,
        snippet = %make_snippet(&body),
        "github {} failed",
        what
    );
    Err(ProviderError::from_status(status, retry_after))
}

/// Reads the body as text and decodes JSON, keeping serde errors typed.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ProviderError> {
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Reads the PR number from the event payload file, if the event carries one.
async fn pr_from_event_file(event: &EventContext) -> Option<u64> {
    let name = event.name.as_deref()?;
    let path = event.path.as_ref()?;
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) => {
            warn!("step2: cannot read event file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(payload) => pr_number_from_event(name, &payload),
        Err(e) => {
            warn!("step2: event file {} is not JSON: {}", path.display(), e);
            None
        }
    }
}

/// PR number carried by an event payload.
///
/// - `pull_request` / `pull_request_target` → `.pull_request.number`
/// - `workflow_run` → `.workflow_run.pull_requests[0].number`
pub fn pr_number_from_event(event_name: &str, payload: &serde_json::Value) -> Option<u64> {
    match event_name {
        "pull_request" | "pull_request_target" => payload
            .get("pull_request")?
            .get("number")?
            .as_u64(),
        "workflow_run" => payload
            .get("workflow_run")?
            .get("pull_requests")?
            .get(0)?
            .get("number")?
            .as_u64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pull_request_events_read_the_number() {
        let payload = json!({"pull_request": {"number": 17}});
        assert_eq!(pr_number_from_event("pull_request", &payload), Some(17));
        assert_eq!(pr_number_from_event("pull_request_target", &payload), Some(17));
        assert_eq!(pr_number_from_event("push", &payload), None);
    }

    #[test]
    fn workflow_run_uses_first_linked_pull_request() {
        let payload = json!({"workflow_run": {"pull_requests": [{"number": 5}, {"number": 9}]}});
        assert_eq!(pr_number_from_event("workflow_run", &payload), Some(5));

        let empty = json!({"workflow_run": {"pull_requests": []}});
        assert_eq!(pr_number_from_event("workflow_run", &empty), None);
    }
}
