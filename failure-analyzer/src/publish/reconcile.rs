//! Pure comment reconciliation: existing comments + analysis + mode → one action.
//!
//! States: no marker-bearing comment vs. one found (the earliest-created is
//! canonical; later duplicates are ignored, never deleted).
//!
//! | existing | update-existing          | replace              | create-new |
//! |----------|--------------------------|----------------------|------------|
//! | none     | create                   | create               | create     |
//! | found    | update (managed region)  | replace (whole body) | create     |

use crate::git_providers::ExistingComment;
use crate::parser::AnalysisResult;
use crate::publish::CommentMode;
use crate::publish::render::{COMMENT_END_MARKER, COMMENT_MARKER, render_managed_region};

/// Network effect the publisher must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    Create,
    Update,
    Replace,
}

impl CommentAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentAction::Create => "create",
            CommentAction::Update => "update",
            CommentAction::Replace => "replace",
        }
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub action: CommentAction,
    /// Comment to edit; `None` for `Create`.
    pub target_id: Option<u64>,
    /// Full body to send.
    pub body: String,
    /// `true` when `body` equals the target's current body byte for byte.
    pub unchanged: bool,
}

/// Canonical managed comment: earliest-created marker-bearing comment (ties by id).
/// Comments without a timestamp rank after every dated one.
pub fn find_canonical(existing: &[ExistingComment]) -> Option<&ExistingComment> {
    existing
        .iter()
        .filter(|c| c.body.contains(COMMENT_MARKER))
        .min_by_key(|c| (c.created_at.is_none(), c.created_at, c.id))
}

/// Decides create/update/replace and renders the body. No I/O.
pub fn reconcile(
    existing: &[ExistingComment],
    analysis: &AnalysisResult,
    mode: CommentMode,
) -> ReconcilePlan {
    let region = render_managed_region(analysis);

    let canonical = match mode {
        CommentMode::CreateNew => None,
        CommentMode::UpdateExisting | CommentMode::Replace => find_canonical(existing),
    };

    let Some(current) = canonical else {
        return ReconcilePlan {
            action: CommentAction::Create,
            target_id: None,
            body: region,
            unchanged: false,
        };
    };

    let (action, body) = match mode {
        CommentMode::Replace => (CommentAction::Replace, region),
        _ => (CommentAction::Update, splice_region(&current.body, &region)),
    };
    ReconcilePlan {
        action,
        target_id: Some(current.id),
        unchanged: body == current.body,
        body,
    }
}

/// Replaces the managed region of `body` with `region`, keeping text outside it.
///
/// Legacy comments without an end marker are rewritten from the marker to the end.
pub fn splice_region(body: &str, region: &str) -> String {
    let Some(start) = body.find(COMMENT_MARKER) else {
        return region.to_string();
    };
    let mut out = String::with_capacity(body.len() + region.len());
    out.push_str(&body[..start]);
    out.push_str(region);
    if let Some(rel) = body[start..].find(COMMENT_END_MARKER) {
        out.push_str(&body[start + rel + COMMENT_END_MARKER.len()..]);
    }
    out
}
