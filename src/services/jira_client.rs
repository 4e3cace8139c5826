//! Jira REST client implementing [`IssueTracker`].

use crate::config::JiraConfig;
use crate::error::AppError;
use crate::models::{IssuePriority, IssueStatus};
use crate::services::external::{IssueInfo, IssueTracker};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
}

/// Subset of `GET /rest/api/2/issue/:key`.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    pub fields: JiraIssueFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssueFields {
    pub priority: Option<JiraNamed>,
    pub status: Option<JiraNamed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraNamed {
    pub name: String,
}

impl JiraIssue {
    pub fn info(&self) -> IssueInfo {
        let name = |field: &Option<JiraNamed>| {
            field
                .as_ref()
                .map(|n| n.name.clone())
                .unwrap_or_default()
        };
        IssueInfo {
            priority: IssuePriority::from(name(&self.fields.priority).as_str()),
            status: IssueStatus::from(name(&self.fields.status).as_str()),
        }
    }
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Full ticket key, e.g. `NC-1234`.
    pub fn issue_key(&self, issue_id: i64) -> String {
        format!("{}-{}", self.config.project_key, issue_id)
    }

    fn issue_url(&self, issue_id: i64) -> String {
        format!(
            "{}/rest/api/2/issue/{}",
            self.config.base_url.trim_end_matches('/'),
            self.issue_key(issue_id)
        )
    }

    pub async fn get_issue(&self, issue_id: i64) -> Result<JiraIssue, AppError> {
        let response = self
            .client
            .get(self.issue_url(issue_id))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .query(&[("fields", "priority,status")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match status {
                StatusCode::UNAUTHORIZED => "Jira credentials rejected".to_string(),
                StatusCode::NOT_FOUND => format!("{} not found", self.issue_key(issue_id)),
                _ => format!(
                    "Request for {} failed ({})",
                    self.issue_key(issue_id),
                    status.as_u16()
                ),
            };
            return Err(AppError::issue_tracker(message));
        }

        response
            .json::<JiraIssue>()
            .await
            .map_err(|e| AppError::issue_tracker(format!("Failed to parse issue: {}", e)))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn load_issue_status(&self, issue_id: i64) -> Result<IssueInfo, AppError> {
        let issue = self.get_issue(issue_id).await?;
        let info = issue.info();
        log::debug!("{}: {:?} / {:?}", issue.key, info.priority, info.status);
        Ok(info)
    }
}
