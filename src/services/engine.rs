//! Shared context for the review engines.
//!
//! [`Engine`] bundles the repository, the three external capabilities and
//! the policy settings. The lifecycle, reallocation, team and digest
//! operations are implemented on it in their own modules.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::Role;
use crate::services::escalation::Escalation;
use crate::services::external::{bounded, IssueTracker, Notifier, SourceControl};
use crate::services::repository::Repository;
use chrono::NaiveTime;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Policy knobs the engines read on every operation.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Role quotas in processing order.
    pub quotas: Vec<(Role, usize)>,

    /// Label set on a merge request when it closes.
    pub reviewed_label: String,

    /// Ticket key prefix used in MR titles.
    pub project_key: String,

    /// Whether tracker linkage is refreshed at all.
    pub tracker_enabled: bool,

    pub escalation: Escalation,

    /// Local time after which the daily digest may go out.
    pub digest_after: NaiveTime,

    /// Upper bound for a single external call.
    pub call_timeout: Duration,

    /// Whether [`Engine::send_digest_on_request`] may send.
    pub allow_manual_digest: bool,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let digest_after =
            NaiveTime::from_hms_opt(config.notifier.time_hour, config.notifier.time_minute, 0)
                .ok_or_else(|| {
                    AppError::config(format!(
                        "invalid digest time {:02}:{:02}",
                        config.notifier.time_hour, config.notifier.time_minute
                    ))
                })?;

        Ok(Self {
            quotas: config.review_party.quotas(),
            reviewed_label: config.gitlab.reviewed_label.clone(),
            project_key: config.jira.project_key.clone(),
            tracker_enabled: config.jira.update_tasks,
            escalation: Escalation::from_config(&config.notifier)?,
            digest_after,
            call_timeout: config.timings.external_call_timeout(),
            allow_manual_digest: config.notifier.allow_manual_digest,
        })
    }
}

/// Review engines over one repository and one set of external services.
#[derive(Clone)]
pub struct Engine {
    pub repo: Arc<dyn Repository>,
    pub source: Arc<dyn SourceControl>,
    pub tracker: Arc<dyn IssueTracker>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: EngineSettings,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn Repository>,
        source: Arc<dyn SourceControl>,
        tracker: Arc<dyn IssueTracker>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repo,
            source,
            tracker,
            notifier,
            settings,
        }
    }

    /// Run an external call under the configured time bound.
    pub(crate) async fn external<T, F>(&self, operation: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        bounded(self.settings.call_timeout, operation, fut).await
    }

    /// Send a direct notification, logging instead of failing.
    pub(crate) async fn notify_quietly(&self, recipient: &str, text: &str) -> bool {
        match self
            .external("notifier.notify", self.notifier.notify(recipient, text))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to notify @{}: {}", recipient, e);
                false
            }
        }
    }
}
