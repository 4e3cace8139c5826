//! Reallocation of a departing reviewer's outstanding reviews.
//!
//! Merge requests are processed one at a time. Each replacement is chosen
//! from a fresh workload read, so reviews reassigned earlier in the same
//! run already count towards the replacement's payload.

use crate::db::now;
use crate::error::AppError;
use crate::models::Reviewer;
use crate::services::engine::Engine;

/// One review that changed hands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub mr_id: i64,
    pub from_reviewer_id: i64,
    pub to_reviewer_id: i64,
}

/// Outcome of a reallocation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReallocationReport {
    pub reassigned: Vec<Reassignment>,

    /// Merge requests with no eligible replacement; the review stays put.
    pub skipped: Vec<i64>,

    /// Merge requests where the reassignment itself failed.
    pub failed: Vec<i64>,
}

impl Engine {
    /// Move every unapproved review of `departing` to a replacement.
    ///
    /// A merge request without an eligible replacement is skipped, as is one
    /// whose reassignment fails; neither aborts the run.
    pub async fn reallocate(&self, departing: &Reviewer) -> Result<ReallocationReport, AppError> {
        let pending = self.repo.list_pending_reviews_for(departing.id).await?;
        let mut report = ReallocationReport::default();

        log::info!(
            "Reallocating {} pending review(s) of @{}",
            pending.len(),
            departing.chat_username
        );

        for review in pending {
            match self.reallocate_one(departing, review.mr_id).await {
                Ok(Some(reassignment)) => report.reassigned.push(reassignment),
                Ok(None) => {
                    log::info!(
                        "No eligible replacement for reviewer {} on MR {}, skipping",
                        departing.id,
                        review.mr_id
                    );
                    report.skipped.push(review.mr_id);
                }
                Err(e) => {
                    log::warn!(
                        "Failed to reassign review of reviewer {} on MR {}: {}",
                        departing.id,
                        review.mr_id,
                        e
                    );
                    report.failed.push(review.mr_id);
                }
            }
        }

        Ok(report)
    }

    async fn reallocate_one(
        &self,
        departing: &Reviewer,
        mr_id: i64,
    ) -> Result<Option<Reassignment>, AppError> {
        let Some(replacement) = self.repo.find_replacement(departing, mr_id).await? else {
            return Ok(None);
        };
        let replacement = replacement.reviewer;

        self.repo
            .reassign_review(mr_id, departing.id, replacement.id, now())
            .await?;
        log::info!(
            "MR {}: review moved from reviewer {} to reviewer {}",
            mr_id,
            departing.id,
            replacement.id
        );

        let mr = self
            .repo
            .get_mr_by_id(mr_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("MergeRequest", mr_id.to_string()))?;

        let text = format!(
            "You now review {} in place of @{}",
            mr.url, departing.chat_username
        );
        self.notify_quietly(&replacement.chat_username, &text).await;

        let party = self.repo.list_party(mr_id).await?;
        self.publish_reviewers(&mr, &party).await;

        Ok(Some(Reassignment {
            mr_id,
            from_reviewer_id: departing.id,
            to_reviewer_id: replacement.id,
        }))
    }
}
