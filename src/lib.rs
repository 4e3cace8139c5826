//! Review Party - review workload balancer and merge request lifecycle bot.
//!
//! Assigns reviewers to GitLab merge requests by workload, follows approvals
//! and threads until every reviewer signed off, reallocates work when a
//! reviewer leaves, and reminds people about overdue reviews.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use config::AppConfig;
use error::AppError;
use services::{
    Engine, EngineSettings, GitLabClient, JiraClient, SqliteRepository, TelegramNotifier,
};
use std::path::Path;
use std::sync::Arc;

/// Open the database and wire the engine to the real GitLab, Jira and
/// Telegram clients.
pub async fn build_engine(config: &AppConfig) -> Result<Engine, AppError> {
    let pool = db::initialize(Path::new(&config.database.path)).await?;
    log::info!("Database ready at {}", config.database.path);

    let settings = EngineSettings::from_config(config)?;

    Ok(Engine::new(
        Arc::new(SqliteRepository::new(pool)),
        Arc::new(GitLabClient::new(config.gitlab.clone())?),
        Arc::new(JiraClient::new(config.jira.clone())?),
        Arc::new(TelegramNotifier::new(config.telegram.clone())?),
        settings,
    ))
}
