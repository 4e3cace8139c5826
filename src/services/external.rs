//! Capabilities the engines consume from outside systems.
//!
//! The concrete implementations live in `gitlab_client`, `jira_client` and
//! `telegram`; tests substitute in-memory fakes.

use crate::error::AppError;
use crate::models::{IssuePriority, IssueStatus};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

/// The parts of a GitLab merge request the engines care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestInfo {
    pub iid: i64,
    pub title: String,
    /// `opened`, `closed`, `locked` or `merged`.
    pub state: String,
    pub author_id: i64,
    pub web_url: String,
}

impl MergeRequestInfo {
    pub fn is_open(&self) -> bool {
        self.state == "opened"
    }
}

/// A resolved GitLab account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabUserRef {
    pub id: i64,
    pub username: String,
}

/// Tracker view of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueInfo {
    pub priority: IssuePriority,
    pub status: IssueStatus,
}

/// Source-control host (GitLab). Merge requests are addressed by iid.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn get_merge_request(&self, iid: i64) -> Result<MergeRequestInfo, AppError>;

    async fn is_merge_request_open(&self, iid: i64) -> Result<bool, AppError> {
        Ok(self.get_merge_request(iid).await?.is_open())
    }

    async fn get_title(&self, iid: i64) -> Result<String, AppError> {
        Ok(self.get_merge_request(iid).await?.title)
    }

    /// GitLab user ids that left a positive signal on the merge request.
    async fn users_who_approved(&self, iid: i64) -> Result<HashSet<i64>, AppError>;

    /// GitLab user id -> whether they authored an unresolved thread.
    async fn users_with_comment_state(&self, iid: i64) -> Result<HashMap<i64, bool>, AppError>;

    async fn set_label(&self, iid: i64, label: &str) -> Result<(), AppError>;

    /// Publish the review party in the merge request description.
    async fn write_reviewers(&self, iid: i64, usernames: &[String]) -> Result<(), AppError>;

    /// Look up an account by numeric id or username.
    async fn find_user(&self, ident: &str) -> Result<GitLabUserRef, AppError>;
}

/// Issue tracker (Jira).
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn load_issue_status(&self, issue_id: i64) -> Result<IssueInfo, AppError>;
}

/// Chat channel (Telegram).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message addressed to one team member.
    async fn notify(&self, recipient: &str, text: &str) -> Result<(), AppError>;

    /// Send a message to the whole team chat.
    async fn broadcast(&self, text: &str) -> Result<(), AppError>;
}

/// Run an external call with an upper time bound.
///
/// No batch item may block a loop forever; an expired call becomes
/// [`AppError::Timeout`] and is handled like any other external failure.
pub async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} timed out after {:?}", operation, limit);
            Err(AppError::timeout(operation))
        }
    }
}
