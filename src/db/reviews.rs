//! Review queries.
//!
//! Only active rows (`retired_at IS NULL`) are touched by signal updates;
//! retired rows are history.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{OpenReview, Review};

const REVIEW_COLUMNS: &str =
    "id, mr_id, reviewer_id, approved, commented, updated_at, created_at, retired_at";

/// Add a reviewer to a merge request's party.
///
/// Fails with a database error if the pair already has an active review.
pub async fn create_review(
    pool: &DbPool,
    mr_id: i64,
    reviewer_id: i64,
    at: i64,
) -> Result<Review, AppError> {
    let sql = format!(
        r#"
        INSERT INTO reviews (mr_id, reviewer_id, approved, commented, updated_at, created_at)
        VALUES (?, ?, 0, 0, ?, ?)
        RETURNING {REVIEW_COLUMNS}
        "#
    );

    let review = sqlx::query_as::<_, Review>(&sql)
        .bind(mr_id)
        .bind(reviewer_id)
        .bind(at)
        .bind(at)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "create_review"))?;

    Ok(review)
}

/// Set the approval flag. Returns `false` when the pair has no active review.
pub async fn update_review_approval(
    pool: &DbPool,
    mr_id: i64,
    reviewer_id: i64,
    approved: bool,
    at: i64,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE reviews
        SET approved = ?,
            updated_at = ?
        WHERE mr_id = ?
          AND reviewer_id = ?
          AND retired_at IS NULL
        "#,
    )
    .bind(approved)
    .bind(at)
    .bind(mr_id)
    .bind(reviewer_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::database_with_op(e.to_string(), "update_review_approval"))?;

    Ok(result.rows_affected() > 0)
}

/// Set the comment flag. Returns `false` when the pair has no active review.
pub async fn update_review_comment(
    pool: &DbPool,
    mr_id: i64,
    reviewer_id: i64,
    commented: bool,
    at: i64,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE reviews
        SET commented = ?,
            updated_at = ?
        WHERE mr_id = ?
          AND reviewer_id = ?
          AND retired_at IS NULL
        "#,
    )
    .bind(commented)
    .bind(at)
    .bind(mr_id)
    .bind(reviewer_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::database_with_op(e.to_string(), "update_review_comment"))?;

    Ok(result.rows_affected() > 0)
}

/// Retire the active review of a pair. Returns `false` if there was none.
pub async fn retire_review(
    pool: &DbPool,
    mr_id: i64,
    reviewer_id: i64,
    at: i64,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE reviews SET retired_at = ? WHERE mr_id = ? AND reviewer_id = ? AND retired_at IS NULL",
    )
    .bind(at)
    .bind(mr_id)
    .bind(reviewer_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move an outstanding review from one reviewer to another.
///
/// Retiring the old row and creating the new one happen in a single
/// transaction, so the MR's pending count never drops to zero in between.
pub async fn reassign_review(
    pool: &DbPool,
    mr_id: i64,
    from_reviewer_id: i64,
    to_reviewer_id: i64,
    at: i64,
) -> Result<Review, AppError> {
    let mut tx = pool.begin().await?;

    let retired = sqlx::query(
        "UPDATE reviews SET retired_at = ? WHERE mr_id = ? AND reviewer_id = ? AND retired_at IS NULL",
    )
    .bind(at)
    .bind(mr_id)
    .bind(from_reviewer_id)
    .execute(&mut *tx)
    .await?;

    if retired.rows_affected() == 0 {
        return Err(AppError::not_found_with_id(
            "Review",
            format!("mr={} reviewer={}", mr_id, from_reviewer_id),
        ));
    }

    let sql = format!(
        r#"
        INSERT INTO reviews (mr_id, reviewer_id, approved, commented, updated_at, created_at)
        VALUES (?, ?, 0, 0, ?, ?)
        RETURNING {REVIEW_COLUMNS}
        "#
    );
    let review = sqlx::query_as::<_, Review>(&sql)
        .bind(mr_id)
        .bind(to_reviewer_id)
        .bind(at)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "reassign_review"))?;

    tx.commit().await?;

    Ok(review)
}

/// Active reviews of a merge request.
pub async fn list_reviews_for_mr(pool: &DbPool, mr_id: i64) -> Result<Vec<Review>, AppError> {
    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE mr_id = ? AND retired_at IS NULL ORDER BY id"
    );
    let reviews = sqlx::query_as::<_, Review>(&sql)
        .bind(mr_id)
        .fetch_all(pool)
        .await?;

    Ok(reviews)
}

/// Every review row of a merge request, retired ones included.
pub async fn list_review_history(pool: &DbPool, mr_id: i64) -> Result<Vec<Review>, AppError> {
    let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE mr_id = ? ORDER BY id");
    let reviews = sqlx::query_as::<_, Review>(&sql)
        .bind(mr_id)
        .fetch_all(pool)
        .await?;

    Ok(reviews)
}

/// A reviewer's active, unapproved reviews on open merge requests, oldest first.
pub async fn list_pending_reviews_for(
    pool: &DbPool,
    reviewer_id: i64,
) -> Result<Vec<Review>, AppError> {
    let sql = r#"
        SELECT r.id, r.mr_id, r.reviewer_id, r.approved, r.commented,
               r.updated_at, r.created_at, r.retired_at
        FROM reviews r
        JOIN merge_requests m ON m.id = r.mr_id
        WHERE r.reviewer_id = ?
          AND r.approved = 0
          AND r.retired_at IS NULL
          AND m.is_closed = 0
        ORDER BY r.id
    "#;
    let reviews = sqlx::query_as::<_, Review>(sql)
        .bind(reviewer_id)
        .fetch_all(pool)
        .await?;

    Ok(reviews)
}

/// Same selection as [`list_pending_reviews_for`], joined with MR details
/// for the digest.
pub async fn list_open_reviews_with_mr(
    pool: &DbPool,
    reviewer_id: i64,
) -> Result<Vec<OpenReview>, AppError> {
    let sql = r#"
        SELECT r.id AS review_id, r.mr_id, r.reviewer_id, r.commented, r.updated_at,
               m.url, m.issue_priority
        FROM reviews r
        JOIN merge_requests m ON m.id = r.mr_id
        WHERE r.reviewer_id = ?
          AND r.approved = 0
          AND r.retired_at IS NULL
          AND m.is_closed = 0
        ORDER BY m.issue_priority DESC, r.id
    "#;
    let reviews = sqlx::query_as::<_, OpenReview>(sql)
        .bind(reviewer_id)
        .fetch_all(pool)
        .await?;

    Ok(reviews)
}
