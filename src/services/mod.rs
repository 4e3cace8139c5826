//! Business logic services.
//!
//! This module contains the review engines and the clients they consume:
//! - capability traits and the SQLite-backed repository
//! - GitLab, Jira and Telegram clients
//! - party selection, MR lifecycle, reallocation, escalation, digest
//! - the background scheduler
//!
//! The engines only see the traits, so tests run them against fakes.

pub mod digest;
pub mod engine;
pub mod escalation;
pub mod external;
pub mod gitlab_client;
pub mod jira_client;
pub mod lifecycle;
pub mod reallocation;
pub mod repository;
pub mod scheduler;
pub mod selector;
pub mod team;
pub mod telegram;

pub use engine::{Engine, EngineSettings};
pub use external::{IssueTracker, Notifier, SourceControl};
pub use gitlab_client::GitLabClient;
pub use jira_client::JiraClient;
pub use lifecycle::{Assignment, SyncReport};
pub use reallocation::ReallocationReport;
pub use repository::{Repository, SqliteRepository};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle};
pub use telegram::TelegramNotifier;
