//! Step 5: Publisher.
//!
//! Applies the reconcile plan to the pull request's comment thread.
//!
//! - One managed comment per PR, re-identified by a hidden marker.
//! - Unchanged body: no network write.
//! - Dry-run: log the action and a body fingerprint, never write.
//! - Writes are issued once; a failure surfaces as [`Error::CommentWrite`].

pub mod reconcile;
pub mod render;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::errors::{ConfigError, Error, RescueResult};
use crate::git_providers::GitHubClient;
use reconcile::{CommentAction, ReconcilePlan};
use render::COMMENT_MARKER;

/// How the run treats an existing managed comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentMode {
    #[default]
    UpdateExisting,
    CreateNew,
    Replace,
}

impl CommentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentMode::UpdateExisting => "update-existing",
            CommentMode::CreateNew => "create-new",
            CommentMode::Replace => "replace",
        }
    }
}

impl fmt::Display for CommentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update-existing" => Ok(CommentMode::UpdateExisting),
            "create-new" => Ok(CommentMode::CreateNew),
            "replace" => Ok(CommentMode::Replace),
            other => Err(ConfigError::InvalidValue {
                var: "INPUT_COMMENT_MODE",
                reason: format!(
                    "unknown mode '{other}', expected update-existing, create-new or replace"
                ),
            }),
        }
    }
}

/// The comment this system owns on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedComment {
    /// Provider id; `None` until first posted (or in dry-run for a create).
    pub id: Option<u64>,
    pub body: String,
    pub mode: CommentMode,
}

impl ManagedComment {
    /// Hidden token re-identifying the comment on later runs.
    pub fn marker(&self) -> &'static str {
        COMMENT_MARKER
    }
}

/// Configuration for the publishing step.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishConfig {
    /// If true, do not send anything; just log what would be posted.
    pub dry_run: bool,
}

/// Why no write was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DryRun,
    Unchanged,
}

/// What the publisher did with a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub action: CommentAction,
    pub comment: ManagedComment,
    /// Why no POST/PATCH was sent; `None` when the write happened.
    pub skipped_reason: Option<SkipReason>,
}

/// Short SHA-256 fingerprint of a body, for dry-run and skip logs.
pub fn body_fingerprint(body: &str) -> String {
    Sha256::digest(body.as_bytes())
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Applies `plan` to pull request `pr`.
///
/// # Errors
/// [`Error::CommentWrite`] when the create/edit request fails. Not retried.
pub async fn publish(
    client: &GitHubClient,
    pr: u64,
    plan: &ReconcilePlan,
    mode: CommentMode,
    cfg: PublishConfig,
) -> RescueResult<PublishOutcome> {
    let t0 = Instant::now();
    let fingerprint = body_fingerprint(&plan.body);
    info!(
        "step5: publish start repo={} pr={} action={} target={:?} mode={} body_sha256={}",
        client.repository(),
        pr,
        plan.action.as_str(),
        plan.target_id,
        mode,
        fingerprint
    );

    let skipped = |reason: SkipReason| PublishOutcome {
        action: plan.action,
        comment: ManagedComment {
            id: plan.target_id,
            body: plan.body.clone(),
            mode,
        },
        skipped_reason: Some(reason),
    };

    if cfg.dry_run {
        info!(
            "step5: dry-run, would {} comment (chars={} body_sha256={})",
            plan.action.as_str(),
            plan.body.chars().count(),
            fingerprint
        );
        return Ok(skipped(SkipReason::DryRun));
    }

    if plan.unchanged {
        info!(
            "step5: comment {:?} already up to date, skipping write",
            plan.target_id
        );
        return Ok(skipped(SkipReason::Unchanged));
    }

    let written = match (plan.action, plan.target_id) {
        (CommentAction::Update | CommentAction::Replace, Some(id)) => {
            client.update_comment(id, &plan.body).await
        }
        _ => client.create_comment(pr, &plan.body).await,
    };
    let id = written.map_err(|e| {
        error!("step5: comment {} failed: {}", plan.action.as_str(), e);
        Error::CommentWrite(e)
    })?;

    info!(
        "step5: publish done action={} comment_id={} in {} ms",
        plan.action.as_str(),
        id,
        t0.elapsed().as_millis()
    );
    Ok(PublishOutcome {
        action: plan.action,
        comment: ManagedComment {
            id: Some(id),
            body: plan.body.clone(),
            mode,
        },
        skipped_reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_leniently_and_rejects_unknown_values() {
        assert_eq!("update-existing".parse::<CommentMode>().unwrap(), CommentMode::UpdateExisting);
        assert_eq!(" Create-New ".parse::<CommentMode>().unwrap(), CommentMode::CreateNew);
        assert_eq!("REPLACE".parse::<CommentMode>().unwrap(), CommentMode::Replace);
        assert!(matches!(
            "upsert".parse::<CommentMode>(),
            Err(ConfigError::InvalidValue { var: "INPUT_COMMENT_MODE", .. })
        ));
        assert_eq!(CommentMode::default(), CommentMode::UpdateExisting);
        assert_eq!(CommentMode::Replace.to_string(), "replace");
    }

    #[test]
    fn fingerprint_is_short_hex_and_stable() {
        let a = body_fingerprint("hello");
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, body_fingerprint("hello"));
        assert_ne!(a, body_fingerprint("hello!"));
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(a, "2cf24dba5fb0");
    }

    #[test]
    fn managed_comment_carries_the_marker() {
        let c = ManagedComment {
            id: None,
            body: String::new(),
            mode: CommentMode::Replace,
        };
        assert_eq!(c.marker(), COMMENT_MARKER);
    }
}
