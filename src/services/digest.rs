//! Daily digest of overdue reviews and QA reminders.
//!
//! The digest goes out once per working day, after the configured local
//! time. When it last went out is tracked in a [`DigestSchedule`] owned by
//! the scheduler and persisted in the `options` table.

use crate::error::AppError;
use crate::models::{MergeRequest, OpenReview, Reviewer};
use crate::services::engine::Engine;
use crate::services::escalation::is_working_day;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Option name the schedule is stored under.
pub const DIGEST_SCHEDULE_OPTION: &str = "digest_schedule";

/// When the daily digest last went out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSchedule {
    pub last_sent: Option<NaiveDate>,
}

impl DigestSchedule {
    /// Whether a digest is due at local time `at`.
    pub fn is_due(&self, at: DateTime<FixedOffset>, send_after: NaiveTime) -> bool {
        is_working_day(at.weekday())
            && at.time() >= send_after
            && self.last_sent != Some(at.date_naive())
    }

    pub fn mark_sent(&mut self, day: NaiveDate) {
        self.last_sent = Some(day);
    }
}

/// What one reviewer is told in the digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub reviewer: Reviewer,

    /// Reviews past their escalation deadline, most urgent ticket first.
    pub overdue: Vec<OpenReview>,

    /// Closed MRs authored by the reviewer whose ticket is still in review.
    pub qa_reminders: Vec<MergeRequest>,
}

impl DigestEntry {
    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.qa_reminders.is_empty()
    }

    /// Plain-text message body.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();

        if !self.overdue.is_empty() {
            lines.push("Waiting for your review:".to_string());
            for review in &self.overdue {
                let marker = if review.commented { " (open threads)" } else { "" };
                lines.push(format!("- {}{}", review.url, marker));
            }
        }

        if !self.qa_reminders.is_empty() {
            lines.push("Reviewed, move the ticket to QA:".to_string());
            for mr in &self.qa_reminders {
                lines.push(format!("- {}", mr.url));
            }
        }

        lines.join("\n")
    }
}

impl Engine {
    /// Digest entries for every active reviewer with something to report.
    pub async fn build_digest(&self, at: i64) -> Result<Vec<DigestEntry>, AppError> {
        let escalation = self.settings.escalation;
        let mut entries = Vec::new();

        for reviewer in self.repo.list_active_reviewers().await? {
            let overdue: Vec<OpenReview> = self
                .repo
                .list_open_reviews_with_mr(reviewer.id)
                .await?
                .into_iter()
                .filter(|r| escalation.is_overdue(r.updated_at, at))
                .collect();
            let qa_reminders = self.repo.list_closed_on_review_mrs(reviewer.id).await?;

            let entry = DigestEntry {
                reviewer,
                overdue,
                qa_reminders,
            };
            if !entry.is_empty() {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    /// Build and send the digest as of `at`. Returns how many reviewers
    /// were notified.
    pub async fn send_digest(&self, at: i64) -> Result<usize, AppError> {
        let entries = self.build_digest(at).await?;
        let mut sent = 0;

        for entry in &entries {
            if self
                .notify_quietly(&entry.reviewer.chat_username, &entry.render())
                .await
            {
                sent += 1;
            }
        }

        log::info!("Daily digest sent to {}/{} reviewer(s)", sent, entries.len());
        Ok(sent)
    }

    /// Send the digest outside the schedule, if manual digests are allowed.
    pub async fn send_digest_on_request(&self, at: i64) -> Result<usize, AppError> {
        if !self.settings.allow_manual_digest {
            return Err(AppError::invalid_input(
                "manual digest is disabled (notifier.allow_manual_digest)",
            ));
        }
        self.send_digest(at).await
    }

    pub async fn load_digest_schedule(&self) -> Result<DigestSchedule, AppError> {
        match self.repo.load_option(DIGEST_SCHEDULE_OPTION).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(DigestSchedule::default()),
        }
    }

    pub async fn save_digest_schedule(&self, schedule: &DigestSchedule) -> Result<(), AppError> {
        let value = serde_json::to_value(schedule)?;
        self.repo.save_option(DIGEST_SCHEDULE_OPTION, &value).await
    }

    /// Send the digest if it is due at `at` and record that it went out.
    ///
    /// Returns `true` when a digest was sent.
    pub async fn run_digest_if_due(
        &self,
        schedule: &mut DigestSchedule,
        at: i64,
    ) -> Result<bool, AppError> {
        let Some(local) = self.settings.escalation.local(at) else {
            return Ok(false);
        };
        if !schedule.is_due(local, self.settings.digest_after) {
            return Ok(false);
        }

        self.send_digest(at).await?;
        schedule.mark_sent(local.date_naive());
        self.save_digest_schedule(schedule).await?;
        Ok(true)
    }
}
