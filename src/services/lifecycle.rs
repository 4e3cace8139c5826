//! Merge request lifecycle: creation, sync, closure, tracker linkage.
//!
//! A tracked merge request is `Open` until either GitLab reports it closed
//! or every active review on it is approved. Closure is terminal.

use crate::db::now;
use crate::error::AppError;
use crate::models::{
    extract_issue_id, is_title_valid, parse_gitlab_iid, MergeRequest, NewMergeRequest, Review,
    Reviewer,
};
use crate::services::engine::Engine;
use crate::services::selector::select_party;
use std::collections::HashMap;

/// Outcome of [`Engine::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// A new review cycle was started with this party.
    Created {
        mr: MergeRequest,
        party: Vec<Reviewer>,
    },
    /// The merge request was already tracked; nothing was selected.
    Existing {
        mr: MergeRequest,
        party: Vec<Reviewer>,
    },
}

impl Assignment {
    pub fn mr(&self) -> &MergeRequest {
        match self {
            Self::Created { mr, .. } | Self::Existing { mr, .. } => mr,
        }
    }

    pub fn party(&self) -> &[Reviewer] {
        match self {
            Self::Created { party, .. } | Self::Existing { party, .. } => party,
        }
    }
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Open merge requests whose signals were pulled.
    pub synced: usize,

    /// Merge requests GitLab reported closed.
    pub force_closed: usize,

    /// Merge requests closed because every reviewer approved.
    pub closed: usize,

    /// Merge request ids whose sync failed.
    pub failed: Vec<i64>,
}

impl Engine {
    /// Start a review cycle: select a party and persist the MR and its reviews.
    ///
    /// Fails with [`AppError::NoEligibleReviewers`] when the party would be
    /// empty. Nothing is written in that case.
    pub async fn create_review_cycle(
        &self,
        input: &NewMergeRequest,
    ) -> Result<(MergeRequest, Vec<Reviewer>), AppError> {
        let pool = self
            .repo
            .list_eligible_reviewers(input.author_id, None)
            .await?;
        let party = select_party(&pool, &self.settings.quotas)?;
        if party.is_empty() {
            return Err(AppError::NoEligibleReviewers);
        }

        let reviewer_ids: Vec<i64> = party.iter().map(|m| m.id()).collect();
        let mr = self
            .repo
            .create_mr_with_party(input, &reviewer_ids, now())
            .await?;

        log::info!(
            "Review cycle started for MR {} (iid {}) with {} reviewer(s)",
            mr.id,
            mr.gitlab_iid,
            party.len()
        );

        Ok((mr, party.into_iter().map(|w| w.reviewer).collect()))
    }

    /// Assign reviewers to the merge request behind `mr_url`.
    ///
    /// Already tracked merge requests return their current party. Titles
    /// with an unbracketed ticket key are rejected. The party is written to
    /// the MR description and announced in chat; failures of either are
    /// logged only.
    pub async fn assign(&self, mr_url: &str) -> Result<Assignment, AppError> {
        let iid = parse_gitlab_iid(mr_url)?;

        if let Some(mr) = self.repo.get_mr_by_gitlab_iid(iid).await? {
            let party = self.repo.list_party(mr.id).await?;
            log::info!("MR iid {} is already tracked as MR {}", iid, mr.id);
            return Ok(Assignment::Existing { mr, party });
        }

        let info = self
            .external("gitlab.get_merge_request", self.source.get_merge_request(iid))
            .await?;

        if !is_title_valid(&info.title, &self.settings.project_key) {
            return Err(AppError::invalid_input_field(
                format!(
                    "ticket key in '{}' must be wrapped in brackets, e.g. [{}-123]",
                    info.title, self.settings.project_key
                ),
                "title",
            ));
        }

        let author = self.repo.get_reviewer_by_gitlab_id(info.author_id).await?;
        if author.is_none() {
            log::debug!("Author {} of MR iid {} is not registered", info.author_id, iid);
        }

        let url = if info.web_url.is_empty() {
            mr_url.trim().to_string()
        } else {
            info.web_url.clone()
        };
        let input = NewMergeRequest {
            gitlab_iid: iid,
            url,
            title: info.title,
            author_id: author.as_ref().map(|a| a.id),
        };

        let (mr, party) = self.create_review_cycle(&input).await?;

        self.publish_reviewers(&mr, &party).await;

        let mentions: Vec<String> = party.iter().map(|r| format!("@{}", r.chat_username)).collect();
        let announcement = format!("Review party for {}: {}", mr.url, mentions.join(" "));
        if let Err(e) = self
            .external("notifier.broadcast", self.notifier.broadcast(&announcement))
            .await
        {
            log::warn!("Failed to announce party for MR {}: {}", mr.id, e);
        }

        Ok(Assignment::Created { mr, party })
    }

    /// Rewrite the reviewer block of the MR description. Logs on failure.
    pub(crate) async fn publish_reviewers(&self, mr: &MergeRequest, party: &[Reviewer]) {
        let usernames: Vec<String> = party.iter().map(|r| r.gitlab_username.clone()).collect();
        if let Err(e) = self
            .external(
                "gitlab.write_reviewers",
                self.source.write_reviewers(mr.gitlab_iid, &usernames),
            )
            .await
        {
            log::warn!("Failed to write reviewers for MR {} (iid {}): {}", mr.id, mr.gitlab_iid, e);
        }
    }

    /// One sync pass over every open merge request, then the close batch.
    ///
    /// A failing merge request is logged and skipped; the rest still sync.
    pub async fn sync_all(&self) -> Result<SyncReport, AppError> {
        self.sync_all_at(now()).await
    }

    /// [`Engine::sync_all`] with signals stamped as received at `at`.
    pub async fn sync_all_at(&self, at: i64) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();
        let open = self.repo.list_open_mrs().await?;
        log::debug!("Syncing {} open merge request(s)", open.len());

        for mr in open {
            match self.sync_mr(mr.clone(), at).await {
                Ok(still_open) => {
                    report.synced += 1;
                    if !still_open {
                        report.force_closed += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to sync MR {} (iid {}): {}", mr.id, mr.gitlab_iid, e);
                    report.failed.push(mr.id);
                }
            }
        }

        report.closed = self.close_reviewed().await?.len();

        log::info!(
            "Sync complete: {} synced, {} closed upstream, {} closed as reviewed, {} failed",
            report.synced,
            report.force_closed,
            report.closed,
            report.failed.len()
        );

        Ok(report)
    }

    /// Pull GitLab signals for one merge request.
    ///
    /// Returns `false` when GitLab reported the MR closed and it was closed
    /// locally without looking at approvals. Flags that change are stamped
    /// with [`Escalation::stamp`](crate::services::escalation::Escalation::stamp)
    /// of `at`; unchanged flags keep their timestamp.
    pub async fn sync_mr(&self, mut mr: MergeRequest, at: i64) -> Result<bool, AppError> {
        let open = self
            .external(
                "gitlab.is_merge_request_open",
                self.source.is_merge_request_open(mr.gitlab_iid),
            )
            .await?;
        if !open {
            self.repo.close_mr(mr.id).await?;
            log::info!("MR {} (iid {}) closed in GitLab, closing locally", mr.id, mr.gitlab_iid);
            return Ok(false);
        }

        let reviews: HashMap<i64, Review> = self
            .repo
            .list_reviews_for_mr(mr.id)
            .await?
            .into_iter()
            .map(|r| (r.reviewer_id, r))
            .collect();
        let stamp = self.settings.escalation.stamp(at);

        let approvers = self
            .external(
                "gitlab.users_who_approved",
                self.source.users_who_approved(mr.gitlab_iid),
            )
            .await?;
        for gitlab_id in approvers {
            let Some(review) = self.review_of(&reviews, gitlab_id).await? else {
                log::debug!("Approval on MR {} by non-party user {}", mr.id, gitlab_id);
                continue;
            };
            if !review.approved {
                self.repo
                    .update_review_approval(mr.id, review.reviewer_id, true, stamp)
                    .await?;
                log::info!("Reviewer {} approved MR {}", review.reviewer_id, mr.id);
            }
        }

        let comment_state = self
            .external(
                "gitlab.users_with_comment_state",
                self.source.users_with_comment_state(mr.gitlab_iid),
            )
            .await?;
        for (gitlab_id, unresolved) in comment_state {
            let Some(review) = self.review_of(&reviews, gitlab_id).await? else {
                log::debug!("Thread on MR {} by non-party user {}", mr.id, gitlab_id);
                continue;
            };
            if review.commented != unresolved {
                self.repo
                    .update_review_comment(mr.id, review.reviewer_id, unresolved, stamp)
                    .await?;
            }
        }

        if self.settings.tracker_enabled && mr.needs_tracker_refresh {
            self.refresh_tracker(&mut mr).await?;
        }

        Ok(true)
    }

    async fn review_of<'a>(
        &self,
        reviews: &'a HashMap<i64, Review>,
        gitlab_id: i64,
    ) -> Result<Option<&'a Review>, AppError> {
        let reviewer = self.repo.get_reviewer_by_gitlab_id(gitlab_id).await?;
        Ok(reviewer.and_then(|r| reviews.get(&r.id)))
    }

    /// Close every open merge request with nothing left to approve.
    ///
    /// Each closed MR gets the reviewed label, and its author is asked to
    /// move the ticket to QA when it is still in review. Label and
    /// notification failures are logged and never undo the closure.
    pub async fn close_reviewed(&self) -> Result<Vec<MergeRequest>, AppError> {
        let closed = self.repo.close_mrs_with_no_pending_approvals().await?;
        let mut finished = Vec::with_capacity(closed.len());

        for mut mr in closed {
            log::info!("MR {} (iid {}) fully approved, closing", mr.id, mr.gitlab_iid);
            self.on_closed(&mut mr).await;
            finished.push(mr);
        }

        Ok(finished)
    }

    async fn on_closed(&self, mr: &mut MergeRequest) {
        let label = self.settings.reviewed_label.clone();
        match self
            .external("gitlab.set_label", self.source.set_label(mr.gitlab_iid, &label))
            .await
        {
            Ok(()) => mr.add_label(&label),
            Err(e) => log::warn!("Failed to label MR {} (iid {}): {}", mr.id, mr.gitlab_iid, e),
        }

        if mr.is_on_review() && mr.needs_qa_notify {
            match self.author_of(mr).await {
                Some(author) => {
                    let text = format!("{} is reviewed, move the ticket to QA", mr.url);
                    if self.notify_quietly(&author.chat_username, &text).await {
                        mr.needs_qa_notify = false;
                    }
                }
                None => log::info!("MR {} has no registered author, skipping QA notice", mr.id),
            }
        }

        if let Err(e) = self.repo.update_mr(mr).await {
            log::error!("Failed to save closed MR {}: {}", mr.id, e);
        }
    }

    async fn author_of(&self, mr: &MergeRequest) -> Option<Reviewer> {
        let author_id = mr.author_id?;
        match self.repo.get_reviewer(author_id).await {
            Ok(author) => author,
            Err(e) => {
                log::warn!("Failed to load author {} of MR {}: {}", author_id, mr.id, e);
                None
            }
        }
    }

    /// Update the ticket linkage of one merge request and persist it.
    ///
    /// Without a ticket id yet, the key is looked up in the current GitLab
    /// title; a title without one ends the refresh. With a ticket, priority
    /// and status are loaded and a terminal status ends the refresh.
    pub async fn refresh_tracker(&self, mr: &mut MergeRequest) -> Result<(), AppError> {
        if mr.issue_id.is_none() {
            mr.title = self
                .external("gitlab.get_title", self.source.get_title(mr.gitlab_iid))
                .await?;
            mr.issue_id = extract_issue_id(&mr.title, &self.settings.project_key);
        }

        match mr.issue_id {
            None => {
                log::debug!("MR {} has no ticket key, tracker refresh done", mr.id);
                mr.needs_tracker_refresh = false;
            }
            Some(issue_id) => {
                let info = self
                    .external(
                        "tracker.load_issue_status",
                        self.tracker.load_issue_status(issue_id),
                    )
                    .await?;
                mr.issue_priority = Some(info.priority);
                mr.issue_status = Some(info.status);
                if info.status.is_terminal() {
                    mr.needs_tracker_refresh = false;
                }
            }
        }

        self.repo.update_mr(mr).await
    }

    /// Refresh tracker linkage of every flagged merge request, open or closed.
    ///
    /// Returns the number refreshed; failures are logged and skipped.
    pub async fn refresh_all_trackers(&self) -> Result<usize, AppError> {
        let pending = self.repo.list_mrs_needing_tracker_refresh().await?;
        let mut refreshed = 0;

        for mut mr in pending {
            match self.refresh_tracker(&mut mr).await {
                Ok(()) => refreshed += 1,
                Err(e) => log::warn!("Failed to refresh tracker for MR {}: {}", mr.id, e),
            }
        }

        Ok(refreshed)
    }
}
