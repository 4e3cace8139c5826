//! Review model: one reviewer's obligation on one merge request.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A (merge request, reviewer) pairing.
///
/// At most one active review exists per pair. Reallocation retires a row
/// by stamping `retired_at` instead of deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub mr_id: i64,
    pub reviewer_id: i64,
    pub approved: bool,
    pub commented: bool,

    /// Last state change (Unix). Approval and comment stamps carry the
    /// weekend shift, see `services::escalation`.
    pub updated_at: i64,

    pub created_at: i64,

    /// Set when ownership moved to another reviewer.
    pub retired_at: Option<i64>,
}

impl Review {
    pub fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }

    /// Active and not yet approved.
    pub fn is_pending(&self) -> bool {
        self.is_active() && !self.approved
    }
}

/// An open review joined with the merge request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct OpenReview {
    pub review_id: i64,
    pub mr_id: i64,
    pub reviewer_id: i64,
    pub commented: bool,
    pub updated_at: i64,
    pub url: String,
    pub issue_priority: Option<super::IssuePriority>,
}
