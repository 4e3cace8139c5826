//! Reviewer model and derived workload.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Role a reviewer fills in a review party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Role {
    #[serde(rename = "dev")]
    #[sqlx(rename = "dev")]
    Developer,
    #[serde(rename = "lead")]
    #[sqlx(rename = "lead")]
    Lead,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Developer, Role::Lead];
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "developer" => Ok(Self::Developer),
            "lead" => Ok(Self::Lead),
            other => Err(AppError::invalid_input_field(
                format!("role must be one of dev, lead (got '{}')", other),
                "role",
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Developer => write!(f, "dev"),
            Self::Lead => write!(f, "lead"),
        }
    }
}

/// A registered team member who can be asked to review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reviewer {
    /// Local database ID.
    pub id: i64,

    /// Chat handle, lowercase, without the leading `@`.
    pub chat_username: String,

    /// GitLab user ID.
    pub gitlab_id: i64,

    /// GitLab username, used to mention the reviewer in MR descriptions.
    pub gitlab_username: String,

    pub role: Role,

    pub is_active: bool,

    /// Registration timestamp (Unix).
    pub created_at: i64,
}

/// Data required to register a reviewer.
#[derive(Debug, Clone)]
pub struct NewReviewer {
    pub chat_username: String,
    pub gitlab_id: i64,
    pub gitlab_username: String,
    pub role: Role,
}

/// A reviewer together with their current payload.
///
/// Payload is the number of active, unapproved reviews the reviewer owns.
/// It is computed by the query that produced this row and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ReviewerWorkload {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub reviewer: Reviewer,
    pub payload: i64,
}

impl ReviewerWorkload {
    pub fn id(&self) -> i64 {
        self.reviewer.id
    }

    pub fn role(&self) -> Role {
        self.reviewer.role
    }
}

/// Normalize a chat handle: trim, drop a leading `@`, lowercase.
pub fn normalize_chat_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}
