//! Workload repository.
//!
//! The engines never talk to SQLite directly; they go through
//! [`Repository`], which `SqliteRepository` implements on top of the
//! `db::*` query modules. Payload is derived by every read, so nothing here
//! caches reviewer or review state.

use crate::db::pool::DbPool;
use crate::db::{merge_requests, options, reviewers, reviews};
use crate::error::AppError;
use crate::models::{
    MergeRequest, NewMergeRequest, NewReviewer, OpenReview, Review, Reviewer, ReviewerWorkload,
    Role,
};
use async_trait::async_trait;

#[async_trait]
pub trait Repository: Send + Sync {
    // Reviewers

    /// Active reviewers sorted by ascending payload, excluding `exclude_author`.
    async fn list_eligible_reviewers(
        &self,
        exclude_author: Option<i64>,
        role: Option<Role>,
    ) -> Result<Vec<ReviewerWorkload>, AppError>;

    async fn find_replacement(
        &self,
        departing: &Reviewer,
        mr_id: i64,
    ) -> Result<Option<ReviewerWorkload>, AppError>;

    async fn get_workload(&self, reviewer_id: i64) -> Result<Option<ReviewerWorkload>, AppError>;
    async fn create_reviewer(&self, input: &NewReviewer) -> Result<Reviewer, AppError>;
    async fn get_reviewer(&self, id: i64) -> Result<Option<Reviewer>, AppError>;
    async fn get_reviewer_by_chat_username(&self, name: &str)
        -> Result<Option<Reviewer>, AppError>;
    async fn get_reviewer_by_gitlab_id(&self, gitlab_id: i64)
        -> Result<Option<Reviewer>, AppError>;
    async fn set_reviewer_active(&self, id: i64, active: bool) -> Result<(), AppError>;
    async fn list_active_reviewers(&self) -> Result<Vec<Reviewer>, AppError>;
    async fn list_party(&self, mr_id: i64) -> Result<Vec<Reviewer>, AppError>;

    // Reviews

    async fn create_review(&self, mr_id: i64, reviewer_id: i64, at: i64)
        -> Result<Review, AppError>;
    async fn update_review_approval(
        &self,
        mr_id: i64,
        reviewer_id: i64,
        approved: bool,
        at: i64,
    ) -> Result<bool, AppError>;
    async fn update_review_comment(
        &self,
        mr_id: i64,
        reviewer_id: i64,
        commented: bool,
        at: i64,
    ) -> Result<bool, AppError>;
    async fn retire_review(&self, mr_id: i64, reviewer_id: i64, at: i64) -> Result<bool, AppError>;
    async fn reassign_review(
        &self,
        mr_id: i64,
        from_reviewer_id: i64,
        to_reviewer_id: i64,
        at: i64,
    ) -> Result<Review, AppError>;
    async fn list_reviews_for_mr(&self, mr_id: i64) -> Result<Vec<Review>, AppError>;
    async fn list_pending_reviews_for(&self, reviewer_id: i64) -> Result<Vec<Review>, AppError>;
    async fn list_open_reviews_with_mr(&self, reviewer_id: i64)
        -> Result<Vec<OpenReview>, AppError>;

    // Merge requests

    async fn create_mr(&self, input: &NewMergeRequest) -> Result<MergeRequest, AppError>;
    async fn create_mr_with_party(
        &self,
        input: &NewMergeRequest,
        reviewer_ids: &[i64],
        at: i64,
    ) -> Result<MergeRequest, AppError>;
    async fn update_mr(&self, mr: &MergeRequest) -> Result<(), AppError>;
    async fn get_mr_by_id(&self, id: i64) -> Result<Option<MergeRequest>, AppError>;
    async fn get_mr_by_gitlab_iid(&self, iid: i64) -> Result<Option<MergeRequest>, AppError>;
    async fn list_open_mrs(&self) -> Result<Vec<MergeRequest>, AppError>;
    async fn list_mrs_needing_tracker_refresh(&self) -> Result<Vec<MergeRequest>, AppError>;
    async fn close_mr(&self, id: i64) -> Result<(), AppError>;
    async fn close_mrs_with_no_pending_approvals(&self) -> Result<Vec<MergeRequest>, AppError>;
    async fn list_closed_on_review_mrs(&self, author_id: i64)
        -> Result<Vec<MergeRequest>, AppError>;

    // Options

    async fn load_option(&self, name: &str) -> Result<Option<serde_json::Value>, AppError>;
    async fn save_option(&self, name: &str, value: &serde_json::Value) -> Result<(), AppError>;
}

/// [`Repository`] backed by the SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_eligible_reviewers(
        &self,
        exclude_author: Option<i64>,
        role: Option<Role>,
    ) -> Result<Vec<ReviewerWorkload>, AppError> {
        reviewers::list_eligible_reviewers(&self.pool, exclude_author, role).await
    }

    async fn find_replacement(
        &self,
        departing: &Reviewer,
        mr_id: i64,
    ) -> Result<Option<ReviewerWorkload>, AppError> {
        reviewers::find_replacement(&self.pool, departing, mr_id).await
    }

    async fn get_workload(&self, reviewer_id: i64) -> Result<Option<ReviewerWorkload>, AppError> {
        reviewers::get_workload(&self.pool, reviewer_id).await
    }

    async fn create_reviewer(&self, input: &NewReviewer) -> Result<Reviewer, AppError> {
        reviewers::create_reviewer(&self.pool, input).await
    }

    async fn get_reviewer(&self, id: i64) -> Result<Option<Reviewer>, AppError> {
        reviewers::get_reviewer(&self.pool, id).await
    }

    async fn get_reviewer_by_chat_username(
        &self,
        name: &str,
    ) -> Result<Option<Reviewer>, AppError> {
        reviewers::get_reviewer_by_chat_username(&self.pool, name).await
    }

    async fn get_reviewer_by_gitlab_id(
        &self,
        gitlab_id: i64,
    ) -> Result<Option<Reviewer>, AppError> {
        reviewers::get_reviewer_by_gitlab_id(&self.pool, gitlab_id).await
    }

    async fn set_reviewer_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        reviewers::set_reviewer_active(&self.pool, id, active).await
    }

    async fn list_active_reviewers(&self) -> Result<Vec<Reviewer>, AppError> {
        reviewers::list_active_reviewers(&self.pool).await
    }

    async fn list_party(&self, mr_id: i64) -> Result<Vec<Reviewer>, AppError> {
        reviewers::list_party(&self.pool, mr_id).await
    }

    async fn create_review(
        &self,
        mr_id: i64,
        reviewer_id: i64,
        at: i64,
    ) -> Result<Review, AppError> {
        reviews::create_review(&self.pool, mr_id, reviewer_id, at).await
    }

    async fn update_review_approval(
        &self,
        mr_id: i64,
        reviewer_id: i64,
        approved: bool,
        at: i64,
    ) -> Result<bool, AppError> {
        reviews::update_review_approval(&self.pool, mr_id, reviewer_id, approved, at).await
    }

    async fn update_review_comment(
        &self,
        mr_id: i64,
        reviewer_id: i64,
        commented: bool,
        at: i64,
    ) -> Result<bool, AppError> {
        reviews::update_review_comment(&self.pool, mr_id, reviewer_id, commented, at).await
    }

    async fn retire_review(&self, mr_id: i64, reviewer_id: i64, at: i64) -> Result<bool, AppError> {
        reviews::retire_review(&self.pool, mr_id, reviewer_id, at).await
    }

    async fn reassign_review(
        &self,
        mr_id: i64,
        from_reviewer_id: i64,
        to_reviewer_id: i64,
        at: i64,
    ) -> Result<Review, AppError> {
        reviews::reassign_review(&self.pool, mr_id, from_reviewer_id, to_reviewer_id, at).await
    }

    async fn list_reviews_for_mr(&self, mr_id: i64) -> Result<Vec<Review>, AppError> {
        reviews::list_reviews_for_mr(&self.pool, mr_id).await
    }

    async fn list_pending_reviews_for(&self, reviewer_id: i64) -> Result<Vec<Review>, AppError> {
        reviews::list_pending_reviews_for(&self.pool, reviewer_id).await
    }

    async fn list_open_reviews_with_mr(
        &self,
        reviewer_id: i64,
    ) -> Result<Vec<OpenReview>, AppError> {
        reviews::list_open_reviews_with_mr(&self.pool, reviewer_id).await
    }

    async fn create_mr(&self, input: &NewMergeRequest) -> Result<MergeRequest, AppError> {
        merge_requests::create_mr(&self.pool, input).await
    }

    async fn create_mr_with_party(
        &self,
        input: &NewMergeRequest,
        reviewer_ids: &[i64],
        at: i64,
    ) -> Result<MergeRequest, AppError> {
        merge_requests::create_mr_with_party(&self.pool, input, reviewer_ids, at).await
    }

    async fn update_mr(&self, mr: &MergeRequest) -> Result<(), AppError> {
        merge_requests::update_mr(&self.pool, mr).await
    }

    async fn get_mr_by_id(&self, id: i64) -> Result<Option<MergeRequest>, AppError> {
        merge_requests::get_mr(&self.pool, id).await
    }

    async fn get_mr_by_gitlab_iid(&self, iid: i64) -> Result<Option<MergeRequest>, AppError> {
        merge_requests::get_mr_by_gitlab_iid(&self.pool, iid).await
    }

    async fn list_open_mrs(&self) -> Result<Vec<MergeRequest>, AppError> {
        merge_requests::list_open_mrs(&self.pool).await
    }

    async fn list_mrs_needing_tracker_refresh(&self) -> Result<Vec<MergeRequest>, AppError> {
        merge_requests::list_mrs_needing_tracker_refresh(&self.pool).await
    }

    async fn close_mr(&self, id: i64) -> Result<(), AppError> {
        merge_requests::close_mr(&self.pool, id).await
    }

    async fn close_mrs_with_no_pending_approvals(&self) -> Result<Vec<MergeRequest>, AppError> {
        merge_requests::close_mrs_with_no_pending_approvals(&self.pool).await
    }

    async fn list_closed_on_review_mrs(
        &self,
        author_id: i64,
    ) -> Result<Vec<MergeRequest>, AppError> {
        merge_requests::list_closed_on_review_mrs(&self.pool, author_id).await
    }

    async fn load_option(&self, name: &str) -> Result<Option<serde_json::Value>, AppError> {
        options::load_option(&self.pool, name).await
    }

    async fn save_option(&self, name: &str, value: &serde_json::Value) -> Result<(), AppError> {
        options::save_option(&self.pool, name, value).await
    }
}
