//! Application configuration.
//!
//! Loaded once at startup from a JSON file. Every section has serde defaults
//! so a minimal file only needs credentials.

use crate::error::AppError;
use crate::models::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sync interval in seconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Default escalation delay in seconds (one working day).
pub const DEFAULT_ESCALATION_DELAY_SECS: i64 = 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gitlab: GitLabConfig,
    #[serde(default)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub review_party: ReviewPartyConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub timings: TimingsConfig,
}

impl AppConfig {
    /// Read and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|e| AppError::config(format!("Invalid config: {}", e)))
    }
}

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.com`).
    #[serde(default)]
    pub base_url: String,

    /// Personal access token.
    #[serde(default)]
    pub token: String,

    /// Project ID or `group/project` path that merge requests live in.
    #[serde(default)]
    pub project_id: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Label applied to a merge request once every reviewer approved.
    #[serde(default = "default_reviewed_label")]
    pub reviewed_label: String,

    /// Award emoji names counted as approval. Empty means any reaction counts.
    #[serde(default = "default_approval_emojis")]
    pub approval_emojis: Vec<String>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            project_id: String::new(),
            timeout_secs: default_timeout_secs(),
            reviewed_label: default_reviewed_label(),
            approval_emojis: default_approval_emojis(),
        }
    }
}

/// Jira connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Ticket key prefix, e.g. `NC` for `[NC-1234]`.
    #[serde(default = "default_project_key")]
    pub project_key: String,

    /// Whether the tracker refresh loop runs at all.
    #[serde(default = "default_true")]
    pub update_tasks: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            project_key: default_project_key(),
            update_tasks: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,

    /// Team chat all notifications go to.
    #[serde(default)]
    pub chat_id: i64,

    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: 0,
            api_url: default_telegram_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// SQLite location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How many reviewers of each role a new merge request gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPartyConfig {
    #[serde(default = "default_dev_quota")]
    pub dev: usize,
    #[serde(default = "default_lead_quota")]
    pub lead: usize,
}

impl Default for ReviewPartyConfig {
    fn default() -> Self {
        Self {
            dev: default_dev_quota(),
            lead: default_lead_quota(),
        }
    }
}

impl ReviewPartyConfig {
    /// Role quotas in declaration order: developers first, then leads.
    pub fn quotas(&self) -> Vec<(Role, usize)> {
        vec![(Role::Developer, self.dev), (Role::Lead, self.lead)]
    }
}

/// Daily digest and escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Whether the sync and digest loops run.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local time of day after which the digest may be sent.
    #[serde(default = "default_time_hour")]
    pub time_hour: u32,
    #[serde(default)]
    pub time_minute: u32,

    /// Escalation delay: how long a review may sit untouched.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: i64,

    /// Offset of the team's working calendar from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Allow sending the digest on request, outside the daily schedule.
    #[serde(default)]
    pub allow_manual_digest: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_hour: default_time_hour(),
            time_minute: 0,
            delay_secs: default_delay_secs(),
            utc_offset_minutes: 0,
            allow_manual_digest: false,
        }
    }
}

/// Timer periods for the background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingsConfig {
    #[serde(default = "default_sync_secs")]
    pub sync_secs: u64,
    #[serde(default = "default_tracker_secs")]
    pub tracker_secs: u64,
    #[serde(default = "default_notify_check_secs")]
    pub notify_check_secs: u64,

    /// Upper bound for any single external call made by the engines.
    #[serde(default = "default_external_call_timeout_secs")]
    pub external_call_timeout_secs: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            sync_secs: default_sync_secs(),
            tracker_secs: default_tracker_secs(),
            notify_check_secs: default_notify_check_secs(),
            external_call_timeout_secs: default_external_call_timeout_secs(),
        }
    }
}

impl TimingsConfig {
    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_reviewed_label() -> String {
    "reviewed".to_string()
}

fn default_approval_emojis() -> Vec<String> {
    vec!["thumbsup".to_string()]
}

fn default_project_key() -> String {
    "NC".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_db_path() -> String {
    "review-party.db".to_string()
}

fn default_dev_quota() -> usize {
    2
}

fn default_lead_quota() -> usize {
    1
}

fn default_time_hour() -> u32 {
    10
}

fn default_delay_secs() -> i64 {
    DEFAULT_ESCALATION_DELAY_SECS
}

fn default_sync_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn default_tracker_secs() -> u64 {
    15 * 60
}

fn default_notify_check_secs() -> u64 {
    60
}

fn default_external_call_timeout_secs() -> u64 {
    45
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_json(r#"{"gitlab": {"token": "t", "project_id": "42"}}"#)
            .unwrap();

        assert_eq!(config.gitlab.token, "t");
        assert_eq!(config.gitlab.reviewed_label, "reviewed");
        assert_eq!(config.gitlab.approval_emojis, vec!["thumbsup".to_string()]);
        assert_eq!(config.review_party, ReviewPartyConfig { dev: 2, lead: 1 });
        assert_eq!(config.notifier.delay_secs, DEFAULT_ESCALATION_DELAY_SECS);
        assert_eq!(config.timings.sync_secs, DEFAULT_SYNC_INTERVAL_SECS);
        assert_eq!(config.jira.project_key, "NC");
        assert!(!config.notifier.allow_manual_digest);
    }

    #[test]
    fn test_quotas_are_dev_then_lead() {
        let party = ReviewPartyConfig { dev: 3, lead: 1 };
        assert_eq!(party.quotas(), vec![(Role::Developer, 3), (Role::Lead, 1)]);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = AppConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
