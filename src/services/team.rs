//! Team roster commands: registration and activity.

use crate::error::AppError;
use crate::models::{normalize_chat_username, NewReviewer, Reviewer, Role};
use crate::services::engine::Engine;
use crate::services::reallocation::ReallocationReport;

/// Result of [`Engine::set_active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityChange {
    pub reviewer: Reviewer,

    /// `false` when the reviewer already had the requested state.
    pub changed: bool,

    /// Present when a deactivation moved reviews away.
    pub reallocation: Option<ReallocationReport>,
}

impl Engine {
    /// Register a team member.
    ///
    /// `gitlab_ident` is a numeric GitLab user id or a username.
    pub async fn register(
        &self,
        chat_username: &str,
        gitlab_ident: &str,
        role: Role,
    ) -> Result<Reviewer, AppError> {
        let chat_username = normalize_chat_username(chat_username);
        if chat_username.is_empty() {
            return Err(AppError::invalid_input_field(
                "chat username is empty",
                "chat_username",
            ));
        }

        if self
            .repo
            .get_reviewer_by_chat_username(&chat_username)
            .await?
            .is_some()
        {
            return Err(AppError::invalid_input_field(
                format!("@{} is already registered", chat_username),
                "chat_username",
            ));
        }

        let user = self
            .external("gitlab.find_user", self.source.find_user(gitlab_ident))
            .await?;

        if let Some(existing) = self.repo.get_reviewer_by_gitlab_id(user.id).await? {
            return Err(AppError::invalid_input_field(
                format!(
                    "GitLab user {} is already registered as @{}",
                    user.username, existing.chat_username
                ),
                "gitlab_ident",
            ));
        }

        let reviewer = self
            .repo
            .create_reviewer(&NewReviewer {
                chat_username,
                gitlab_id: user.id,
                gitlab_username: user.username,
                role,
            })
            .await?;

        log::info!(
            "Registered @{} as {} (GitLab {})",
            reviewer.chat_username,
            reviewer.role,
            reviewer.gitlab_id
        );

        Ok(reviewer)
    }

    /// Mark a reviewer active or inactive.
    ///
    /// Deactivation hands the reviewer's outstanding reviews to others.
    pub async fn set_active(
        &self,
        chat_username: &str,
        active: bool,
    ) -> Result<ActivityChange, AppError> {
        let chat_username = normalize_chat_username(chat_username);
        let mut reviewer = self
            .repo
            .get_reviewer_by_chat_username(&chat_username)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Reviewer", chat_username.clone()))?;

        if reviewer.is_active == active {
            return Ok(ActivityChange {
                reviewer,
                changed: false,
                reallocation: None,
            });
        }

        self.repo.set_reviewer_active(reviewer.id, active).await?;
        reviewer.is_active = active;
        log::info!(
            "@{} is now {}",
            reviewer.chat_username,
            if active { "active" } else { "inactive" }
        );

        let reallocation = if active {
            None
        } else {
            Some(self.reallocate(&reviewer).await?)
        };

        Ok(ActivityChange {
            reviewer,
            changed: true,
            reallocation,
        })
    }
}
