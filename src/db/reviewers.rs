//! Reviewer queries, including the derived workload views.

use crate::db::now;
use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{NewReviewer, Reviewer, ReviewerWorkload, Role};

const REVIEWER_COLUMNS: &str =
    "u.id, u.chat_username, u.gitlab_id, u.gitlab_username, u.role, u.is_active, u.created_at";

/// Select list for workload rows.
///
/// `payload` counts active, unapproved reviews on open merge requests.
/// `last_assignment` is the reviewer's newest review row id, used as the
/// tie-break so equally loaded reviewers take turns.
fn workload_select() -> String {
    format!(
        r#"
        SELECT {REVIEWER_COLUMNS},
               (SELECT COUNT(*)
                FROM reviews r
                JOIN merge_requests m ON m.id = r.mr_id
                WHERE r.reviewer_id = u.id
                  AND r.approved = 0
                  AND r.retired_at IS NULL
                  AND m.is_closed = 0) AS payload,
               (SELECT COALESCE(MAX(r.id), 0)
                FROM reviews r
                WHERE r.reviewer_id = u.id) AS last_assignment
        FROM reviewers u
        "#
    )
}

const WORKLOAD_ORDER: &str = "ORDER BY payload ASC, last_assignment ASC, u.id ASC";

/// Register a reviewer.
pub async fn create_reviewer(pool: &DbPool, input: &NewReviewer) -> Result<Reviewer, AppError> {
    let reviewer = sqlx::query_as::<_, Reviewer>(
        r#"
        INSERT INTO reviewers (chat_username, gitlab_id, gitlab_username, role, is_active, created_at)
        VALUES (?, ?, ?, ?, 1, ?)
        RETURNING id, chat_username, gitlab_id, gitlab_username, role, is_active, created_at
        "#,
    )
    .bind(&input.chat_username)
    .bind(input.gitlab_id)
    .bind(&input.gitlab_username)
    .bind(input.role)
    .bind(now())
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::database_with_op(e.to_string(), "create_reviewer"))?;

    Ok(reviewer)
}

pub async fn get_reviewer(pool: &DbPool, id: i64) -> Result<Option<Reviewer>, AppError> {
    let sql = format!("SELECT {REVIEWER_COLUMNS} FROM reviewers u WHERE u.id = ?");
    let reviewer = sqlx::query_as::<_, Reviewer>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(reviewer)
}

pub async fn get_reviewer_by_chat_username(
    pool: &DbPool,
    chat_username: &str,
) -> Result<Option<Reviewer>, AppError> {
    let sql = format!("SELECT {REVIEWER_COLUMNS} FROM reviewers u WHERE u.chat_username = ?");
    let reviewer = sqlx::query_as::<_, Reviewer>(&sql)
        .bind(chat_username)
        .fetch_optional(pool)
        .await?;

    Ok(reviewer)
}

pub async fn get_reviewer_by_gitlab_id(
    pool: &DbPool,
    gitlab_id: i64,
) -> Result<Option<Reviewer>, AppError> {
    let sql = format!("SELECT {REVIEWER_COLUMNS} FROM reviewers u WHERE u.gitlab_id = ?");
    let reviewer = sqlx::query_as::<_, Reviewer>(&sql)
        .bind(gitlab_id)
        .fetch_optional(pool)
        .await?;

    Ok(reviewer)
}

/// Flip the activity flag.
pub async fn set_reviewer_active(pool: &DbPool, id: i64, active: bool) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE reviewers SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found_with_id("Reviewer", id.to_string()));
    }

    Ok(())
}

pub async fn list_active_reviewers(pool: &DbPool) -> Result<Vec<Reviewer>, AppError> {
    let sql = format!(
        "SELECT {REVIEWER_COLUMNS} FROM reviewers u WHERE u.is_active = 1 ORDER BY u.chat_username"
    );
    let reviewers = sqlx::query_as::<_, Reviewer>(&sql).fetch_all(pool).await?;

    Ok(reviewers)
}

/// Active reviewers ordered by ascending payload.
///
/// # Arguments
/// * `exclude_id` - Reviewer to leave out (the MR author)
/// * `role` - Restrict to one role
pub async fn list_eligible_reviewers(
    pool: &DbPool,
    exclude_id: Option<i64>,
    role: Option<Role>,
) -> Result<Vec<ReviewerWorkload>, AppError> {
    let sql = format!(
        r#"
        {}
        WHERE u.is_active = 1
          AND (?1 IS NULL OR u.id != ?1)
          AND (?2 IS NULL OR u.role = ?2)
        {WORKLOAD_ORDER}
        "#,
        workload_select()
    );

    let rows = sqlx::query_as::<_, ReviewerWorkload>(&sql)
        .bind(exclude_id)
        .bind(role)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Payload view of a single reviewer.
pub async fn get_workload(pool: &DbPool, id: i64) -> Result<Option<ReviewerWorkload>, AppError> {
    let sql = format!("{} WHERE u.id = ?", workload_select());
    let row = sqlx::query_as::<_, ReviewerWorkload>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Lowest-payload replacement for `departing` on merge request `mr_id`.
///
/// Candidates are active, share the departing reviewer's role, hold no
/// active review on the MR, and are not its author.
pub async fn find_replacement(
    pool: &DbPool,
    departing: &Reviewer,
    mr_id: i64,
) -> Result<Option<ReviewerWorkload>, AppError> {
    let sql = format!(
        r#"
        {}
        WHERE u.is_active = 1
          AND u.role = ?1
          AND u.id != ?2
          AND u.id NOT IN (SELECT reviewer_id
                           FROM reviews
                           WHERE mr_id = ?3
                             AND retired_at IS NULL)
          AND u.id NOT IN (SELECT author_id
                           FROM merge_requests
                           WHERE id = ?3
                             AND author_id IS NOT NULL)
        {WORKLOAD_ORDER}
        LIMIT 1
        "#,
        workload_select()
    );

    let row = sqlx::query_as::<_, ReviewerWorkload>(&sql)
        .bind(departing.role)
        .bind(departing.id)
        .bind(mr_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Reviewers holding an active review on the merge request.
pub async fn list_party(pool: &DbPool, mr_id: i64) -> Result<Vec<Reviewer>, AppError> {
    let sql = format!(
        r#"
        SELECT {REVIEWER_COLUMNS}
        FROM reviewers u
        JOIN reviews r ON r.reviewer_id = u.id
        WHERE r.mr_id = ?
          AND r.retired_at IS NULL
        ORDER BY r.id
        "#
    );
    let reviewers = sqlx::query_as::<_, Reviewer>(&sql)
        .bind(mr_id)
        .fetch_all(pool)
        .await?;

    Ok(reviewers)
}
