//! GitLab API client.
//!
//! HTTP client for GitLab API v4 scoped to the one project the team's
//! merge requests live in. Implements [`SourceControl`].

use crate::config::GitLabConfig;
use crate::error::AppError;
use crate::services::external::{GitLabUserRef, MergeRequestInfo, SourceControl};
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Opening marker of the reviewer block in an MR description.
const REVIEWERS_START: &str = "Reviewers: ";

/// Closing marker of the reviewer block.
const REVIEWERS_END: &str = "//";

/// GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    config: GitLabConfig,
}

/// GitLab merge request from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabMergeRequest {
    pub id: i64,
    pub iid: i64,
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
    pub web_url: String,
    pub author: GitLabUser,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// GitLab user from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

/// Approval state from `/merge_requests/:iid/approvals`.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestApprovals {
    #[serde(default)]
    pub approved_by: Vec<ApprovedBy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovedBy {
    pub user: GitLabUser,
}

/// Award emoji (reaction) on a merge request.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabAwardEmoji {
    pub id: i64,
    pub name: String,
    pub user: GitLabUser,
}

/// GitLab discussion from API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabDiscussion {
    pub id: String,
    #[serde(default)]
    pub notes: Vec<GitLabDiscussionNote>,
}

/// Note inside a discussion.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabDiscussionNote {
    pub id: i64,
    pub author: GitLabUser,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub resolvable: bool,
    #[serde(default)]
    pub resolved: Option<bool>,
}

/// Body for `PUT /merge_requests/:iid`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateMergeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Comma-separated labels to add without touching existing ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_labels: Option<String>,
}

impl GitLabClient {
    /// Create a new GitLab client.
    pub fn new(config: GitLabConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&config.token)
            .map_err(|_| AppError::config("Invalid GitLab token format"))?;
        headers.insert("PRIVATE-TOKEN", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Endpoint path of a merge request in the configured project.
    fn mr_endpoint(&self, iid: i64, suffix: &str) -> String {
        format!(
            "/projects/{}/merge_requests/{}{}",
            urlencoding::encode(&self.config.project_id),
            iid,
            suffix
        )
    }

    /// Turn a non-success response into a GitLab API error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::gitlab_api(format!("Failed to parse response: {}", e)));
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let body_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                // GitLab returns errors as {"message": "..."} or {"error": "..."}
                v.get("message")
                    .or_else(|| v.get("error"))
                    .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
            });

        let message = match (status, &body_message) {
            (StatusCode::UNAUTHORIZED, _) => "GitLab token expired or revoked".to_string(),
            (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
            (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg.clone(),
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        Err(AppError::gitlab_api_full(message, status_code, endpoint))
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, AppError> {
        let response = self.client.get(self.api_url(endpoint)).send().await?;
        self.handle_response(response, endpoint).await
    }

    /// Fetch all pages of a paginated endpoint.
    async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, AppError> {
        let mut all_data = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .client
                .get(self.api_url(endpoint))
                .query(&[("page", page.to_string()), ("per_page", "100".to_string())])
                .send()
                .await?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u32>().ok());

            let data = self.handle_response::<Vec<T>>(response, endpoint).await?;
            all_data.extend(data);

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(all_data)
    }

    /// Get a single merge request by IID.
    pub async fn fetch_merge_request(&self, iid: i64) -> Result<GitLabMergeRequest, AppError> {
        self.get_json(&self.mr_endpoint(iid, "")).await
    }

    pub async fn get_mr_approvals(&self, iid: i64) -> Result<MergeRequestApprovals, AppError> {
        self.get_json(&self.mr_endpoint(iid, "/approvals")).await
    }

    pub async fn list_award_emoji(&self, iid: i64) -> Result<Vec<GitLabAwardEmoji>, AppError> {
        self.get_all_pages(&self.mr_endpoint(iid, "/award_emoji")).await
    }

    pub async fn list_discussions(&self, iid: i64) -> Result<Vec<GitLabDiscussion>, AppError> {
        self.get_all_pages(&self.mr_endpoint(iid, "/discussions")).await
    }

    pub async fn update_merge_request(
        &self,
        iid: i64,
        update: &UpdateMergeRequest,
    ) -> Result<GitLabMergeRequest, AppError> {
        let endpoint = self.mr_endpoint(iid, "");
        let response = self
            .client
            .put(self.api_url(&endpoint))
            .json(update)
            .send()
            .await?;
        self.handle_response(response, &endpoint).await
    }

    pub async fn get_user(&self, id: i64) -> Result<GitLabUser, AppError> {
        self.get_json(&format!("/users/{}", id)).await
    }

    pub async fn find_users_by_username(&self, username: &str) -> Result<Vec<GitLabUser>, AppError> {
        let endpoint = "/users";
        let response = self
            .client
            .get(self.api_url(endpoint))
            .query(&[("username", username)])
            .send()
            .await?;
        self.handle_response(response, endpoint).await
    }
}

#[async_trait]
impl SourceControl for GitLabClient {
    async fn get_merge_request(&self, iid: i64) -> Result<MergeRequestInfo, AppError> {
        let mr = self.fetch_merge_request(iid).await?;
        log::debug!("GitLab MR {} state={}", iid, mr.state);
        Ok(MergeRequestInfo {
            iid: mr.iid,
            title: mr.title,
            state: mr.state,
            author_id: mr.author.id,
            web_url: mr.web_url,
        })
    }

    async fn users_who_approved(&self, iid: i64) -> Result<HashSet<i64>, AppError> {
        let approvals = self.get_mr_approvals(iid).await?;
        let emoji = self.list_award_emoji(iid).await?;
        Ok(collect_approvers(
            &approvals,
            &emoji,
            &self.config.approval_emojis,
        ))
    }

    async fn users_with_comment_state(&self, iid: i64) -> Result<HashMap<i64, bool>, AppError> {
        let discussions = self.list_discussions(iid).await?;
        Ok(collect_comment_state(&discussions))
    }

    async fn set_label(&self, iid: i64, label: &str) -> Result<(), AppError> {
        let update = UpdateMergeRequest {
            add_labels: Some(label.to_string()),
            ..Default::default()
        };
        self.update_merge_request(iid, &update).await?;
        Ok(())
    }

    async fn write_reviewers(&self, iid: i64, usernames: &[String]) -> Result<(), AppError> {
        let mr = self.fetch_merge_request(iid).await?;
        let description =
            replace_reviewer_block(mr.description.as_deref().unwrap_or_default(), usernames);
        let update = UpdateMergeRequest {
            description: Some(description),
            ..Default::default()
        };
        self.update_merge_request(iid, &update).await?;
        Ok(())
    }

    async fn find_user(&self, ident: &str) -> Result<GitLabUserRef, AppError> {
        let ident = ident.trim().trim_start_matches('@');

        let user = match ident.parse::<i64>() {
            Ok(id) => self.get_user(id).await?,
            Err(_) => {
                let mut matches = self.find_users_by_username(ident).await?;
                match matches.len() {
                    0 => return Err(AppError::not_found_with_id("GitLab user", ident)),
                    1 => matches.remove(0),
                    _ => {
                        return Err(AppError::invalid_input(format!(
                            "more than one GitLab user matches '{}', use the numeric id",
                            ident
                        )))
                    }
                }
            }
        };

        Ok(GitLabUserRef {
            id: user.id,
            username: user.username,
        })
    }
}

/// Users who approved through the approvals API or with a counted reaction.
///
/// An empty `allowed_emojis` list means every reaction counts.
pub fn collect_approvers(
    approvals: &MergeRequestApprovals,
    emoji: &[GitLabAwardEmoji],
    allowed_emojis: &[String],
) -> HashSet<i64> {
    let mut users: HashSet<i64> = approvals.approved_by.iter().map(|a| a.user.id).collect();

    users.extend(
        emoji
            .iter()
            .filter(|e| allowed_emojis.is_empty() || allowed_emojis.iter().any(|a| a == &e.name))
            .map(|e| e.user.id),
    );

    users
}

/// Map each thread starter to whether any thread they started is unresolved.
///
/// Only resolvable discussions count; system notes are ignored.
pub fn collect_comment_state(discussions: &[GitLabDiscussion]) -> HashMap<i64, bool> {
    let mut users: HashMap<i64, bool> = HashMap::new();

    for discussion in discussions {
        let notes: Vec<&GitLabDiscussionNote> =
            discussion.notes.iter().filter(|n| !n.system).collect();
        let (Some(first), Some(last)) = (notes.first(), notes.last()) else {
            continue;
        };
        if !first.resolvable {
            continue;
        }

        let unresolved = !last.resolved.unwrap_or(false);
        let entry = users.entry(first.author.id).or_insert(false);
        *entry = *entry || unresolved;
    }

    users
}

/// Replace (or append) the `Reviewers: @a @b //` block in a description.
pub fn replace_reviewer_block(description: &str, usernames: &[String]) -> String {
    let mut base = strip_reviewer_block(description).trim_end().to_string();

    let mentions: Vec<String> = usernames.iter().map(|u| format!("@{}", u)).collect();
    if !base.is_empty() {
        base.push_str("\n\n");
    }
    base.push_str(REVIEWERS_START);
    base.push_str(&mentions.join(" "));
    base.push(' ');
    base.push_str(REVIEWERS_END);
    base
}

fn strip_reviewer_block(description: &str) -> String {
    let Some(start) = description.find(REVIEWERS_START) else {
        return description.to_string();
    };
    let Some(len) = description[start..].find(REVIEWERS_END) else {
        return description.to_string();
    };

    let mut out = description[..start].to_string();
    out.push_str(&description[start + len + REVIEWERS_END.len()..]);
    out
}
