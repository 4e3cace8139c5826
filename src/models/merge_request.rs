//! Merge request model and issue-tracker linkage.

use crate::error::AppError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Issue priority as reported by the tracker. Higher value = more urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
pub enum IssuePriority {
    Undefined = 0,
    Lowest = 5,
    Low = 7,
    Medium = 10,
    High = 15,
    Highest = 20,
}

impl From<&str> for IssuePriority {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "highest" => Self::Highest,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            "lowest" => Self::Lowest,
            _ => Self::Undefined,
        }
    }
}

/// Issue workflow status as reported by the tracker, in workflow order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
pub enum IssueStatus {
    Undefined = 0,
    Trash = 1,
    Analysis = 5,
    Backlog = 10,
    Todo = 20,
    Reopened = 30,
    InProgress = 40,
    OnReview = 50,
    ReadyForQa = 60,
    Testing = 70,
    Approved = 80,
    Merged = 90,
    Ready = 100,
    Done = 110,
}

impl IssueStatus {
    /// Statuses after which the tracker linkage no longer changes.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Merged | Self::Ready | Self::Done
        )
    }
}

impl From<&str> for IssueStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trash" => Self::Trash,
            "analysis" => Self::Analysis,
            "backlog" => Self::Backlog,
            "to do" | "todo" => Self::Todo,
            "reopened" => Self::Reopened,
            "in progress" => Self::InProgress,
            "on review" => Self::OnReview,
            "ready for qa" => Self::ReadyForQa,
            "testing" => Self::Testing,
            "approved" => Self::Approved,
            "merged" => Self::Merged,
            "ready" => Self::Ready,
            "done" => Self::Done,
            _ => Self::Undefined,
        }
    }
}

/// A merge request tracked by the bot.
///
/// Never deleted: closing is terminal but the row stays for the digest and
/// audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MergeRequest {
    /// Local database ID.
    pub id: i64,

    /// Project-scoped MR number in GitLab.
    pub gitlab_iid: i64,

    /// URL to the MR in the GitLab web UI.
    pub url: String,

    pub title: String,

    /// Author, if they are a registered reviewer.
    pub author_id: Option<i64>,

    pub is_closed: bool,

    /// Numeric part of the linked ticket key.
    pub issue_id: Option<i64>,
    pub issue_priority: Option<IssuePriority>,
    pub issue_status: Option<IssueStatus>,

    pub needs_tracker_refresh: bool,
    pub needs_qa_notify: bool,

    /// JSON array of GitLab labels.
    pub labels: String,

    /// Creation timestamp (Unix).
    pub created_at: i64,

    /// Closure timestamp (Unix).
    pub closed_at: Option<i64>,
}

impl MergeRequest {
    /// Parse labels from JSON string.
    pub fn labels_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.labels).unwrap_or_default()
    }

    /// Add a label to the local label set, keeping it deduplicated.
    pub fn add_label(&mut self, label: &str) {
        let mut labels = self.labels_vec();
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
        self.labels = serde_json::to_string(&labels).unwrap_or_else(|_| "[]".to_string());
    }

    /// Whether the linked ticket is waiting in review.
    pub fn is_on_review(&self) -> bool {
        self.issue_status == Some(IssueStatus::OnReview)
    }
}

/// Data required to start tracking a merge request.
#[derive(Debug, Clone)]
pub struct NewMergeRequest {
    pub gitlab_iid: i64,
    pub url: String,
    pub title: String,
    pub author_id: Option<i64>,
}

/// Extract the MR iid from a GitLab web URL.
///
/// e.g., "https://gitlab.com/group/project/-/merge_requests/42" -> 42
pub fn parse_gitlab_iid(url: &str) -> Result<i64, AppError> {
    let trimmed = url.trim().trim_end_matches('/');
    let tail = trimmed
        .split("merge_requests/")
        .nth(1)
        .ok_or_else(|| AppError::invalid_input_field(format!("not a merge request URL: {}", url), "url"))?;

    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse()
        .map_err(|_| AppError::invalid_input_field(format!("no merge request number in {}", url), "url"))
}

/// Extract the ticket number from a title like `[NC-1234] Fix login`.
///
/// Only keys wrapped in square brackets count.
pub fn extract_issue_id(title: &str, project_key: &str) -> Option<i64> {
    let pattern = format!(r"\[{}-(\d+)\]", regex::escape(project_key));
    let re = Regex::new(&pattern).ok()?;
    re.captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Check that every ticket key in the title is bracketed.
///
/// Titles without any ticket key are accepted.
pub fn is_title_valid(title: &str, project_key: &str) -> bool {
    let key = regex::escape(project_key);
    let (Ok(any), Ok(bracketed)) = (
        Regex::new(&format!(r"{}-\d+", key)),
        Regex::new(&format!(r"\[{}-\d+\]", key)),
    ) else {
        return true;
    };
    any.find_iter(title).count() <= bracketed.find_iter(title).count()
}
