//! Data models for the application.
//!
//! These models represent the entities stored in the local SQLite database.
//! All row types derive `FromRow` for SQLx queries.

pub mod merge_request;
pub mod review;
pub mod reviewer;

// Re-exports for convenient access
pub use merge_request::{
    extract_issue_id, is_title_valid, parse_gitlab_iid, IssuePriority, IssueStatus, MergeRequest,
    NewMergeRequest,
};
pub use review::{OpenReview, Review};
pub use reviewer::{normalize_chat_username, NewReviewer, Reviewer, ReviewerWorkload, Role};
