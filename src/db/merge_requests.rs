//! Merge request queries.

use crate::db::now;
use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{IssueStatus, MergeRequest, NewMergeRequest};

const MR_COLUMNS: &str = "id, gitlab_iid, url, title, author_id, is_closed, issue_id, \
     issue_priority, issue_status, needs_tracker_refresh, needs_qa_notify, labels, \
     created_at, closed_at";

/// Start tracking a merge request as open, with both follow-up flags set.
pub async fn create_mr(pool: &DbPool, input: &NewMergeRequest) -> Result<MergeRequest, AppError> {
    let sql = format!(
        r#"
        INSERT INTO merge_requests (gitlab_iid, url, title, author_id, is_closed,
                                    needs_tracker_refresh, needs_qa_notify, labels, created_at)
        VALUES (?, ?, ?, ?, 0, 1, 1, '[]', ?)
        RETURNING {MR_COLUMNS}
        "#
    );

    let mr = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(input.gitlab_iid)
        .bind(&input.url)
        .bind(&input.title)
        .bind(input.author_id)
        .bind(now())
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "create_mr"))?;

    Ok(mr)
}

/// Start tracking a merge request together with its review party.
///
/// The MR row and every review row are written in one transaction, so a
/// concurrent close batch never sees the MR without its reviews. If any
/// insert fails nothing is kept.
pub async fn create_mr_with_party(
    pool: &DbPool,
    input: &NewMergeRequest,
    reviewer_ids: &[i64],
    at: i64,
) -> Result<MergeRequest, AppError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        INSERT INTO merge_requests (gitlab_iid, url, title, author_id, is_closed,
                                    needs_tracker_refresh, needs_qa_notify, labels, created_at)
        VALUES (?, ?, ?, ?, 0, 1, 1, '[]', ?)
        RETURNING {MR_COLUMNS}
        "#
    );
    let mr = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(input.gitlab_iid)
        .bind(&input.url)
        .bind(&input.title)
        .bind(input.author_id)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "create_mr_with_party"))?;

    for reviewer_id in reviewer_ids {
        sqlx::query(
            r#"
            INSERT INTO reviews (mr_id, reviewer_id, approved, commented, updated_at, created_at)
            VALUES (?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(mr.id)
        .bind(reviewer_id)
        .bind(at)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "create_mr_with_party"))?;
    }

    tx.commit().await?;
    Ok(mr)
}

/// Persist the mutable fields of a merge request.
///
/// The closed flag is not written here; closing goes through [`close_mr`]
/// and [`close_mrs_with_no_pending_approvals`] only.
pub async fn update_mr(pool: &DbPool, mr: &MergeRequest) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE merge_requests
        SET title = ?,
            issue_id = ?,
            issue_priority = ?,
            issue_status = ?,
            needs_tracker_refresh = ?,
            needs_qa_notify = ?,
            labels = ?
        WHERE id = ?
        "#,
    )
    .bind(&mr.title)
    .bind(mr.issue_id)
    .bind(mr.issue_priority)
    .bind(mr.issue_status)
    .bind(mr.needs_tracker_refresh)
    .bind(mr.needs_qa_notify)
    .bind(&mr.labels)
    .bind(mr.id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_mr(pool: &DbPool, id: i64) -> Result<Option<MergeRequest>, AppError> {
    let sql = format!("SELECT {MR_COLUMNS} FROM merge_requests WHERE id = ?");
    let mr = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(mr)
}

pub async fn get_mr_by_gitlab_iid(
    pool: &DbPool,
    gitlab_iid: i64,
) -> Result<Option<MergeRequest>, AppError> {
    let sql = format!("SELECT {MR_COLUMNS} FROM merge_requests WHERE gitlab_iid = ?");
    let mr = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(gitlab_iid)
        .fetch_optional(pool)
        .await?;

    Ok(mr)
}

/// All open merge requests in creation order.
pub async fn list_open_mrs(pool: &DbPool) -> Result<Vec<MergeRequest>, AppError> {
    let sql = format!("SELECT {MR_COLUMNS} FROM merge_requests WHERE is_closed = 0 ORDER BY id");
    let mrs = sqlx::query_as::<_, MergeRequest>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(mrs)
}

/// Merge requests (open or closed) whose tracker linkage is still moving.
pub async fn list_mrs_needing_tracker_refresh(pool: &DbPool) -> Result<Vec<MergeRequest>, AppError> {
    let sql = format!(
        "SELECT {MR_COLUMNS} FROM merge_requests WHERE needs_tracker_refresh = 1 ORDER BY id"
    );
    let mrs = sqlx::query_as::<_, MergeRequest>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(mrs)
}

/// Close one merge request regardless of its reviews.
pub async fn close_mr(pool: &DbPool, id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE merge_requests SET is_closed = 1, closed_at = ? WHERE id = ? AND is_closed = 0")
        .bind(now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "close_mr"))?;

    Ok(())
}

/// Close every open merge request with no active, unapproved review.
///
/// A merge request with no reviews at all has nothing outstanding and is
/// closed too. Returns the rows that were closed by this call.
pub async fn close_mrs_with_no_pending_approvals(
    pool: &DbPool,
) -> Result<Vec<MergeRequest>, AppError> {
    let sql = format!(
        r#"
        UPDATE merge_requests
        SET is_closed = 1,
            closed_at = ?
        WHERE is_closed = 0
          AND id NOT IN (SELECT DISTINCT mr_id
                         FROM reviews
                         WHERE approved = 0
                           AND retired_at IS NULL)
        RETURNING {MR_COLUMNS}
        "#
    );

    let mut closed = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(now())
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::database_with_op(e.to_string(), "close_mrs"))?;

    closed.sort_by_key(|mr| mr.id);
    Ok(closed)
}

/// Closed merge requests by `author_id` whose ticket still sits in review,
/// most urgent first.
pub async fn list_closed_on_review_mrs(
    pool: &DbPool,
    author_id: i64,
) -> Result<Vec<MergeRequest>, AppError> {
    let sql = format!(
        r#"
        SELECT {MR_COLUMNS}
        FROM merge_requests
        WHERE author_id = ?
          AND is_closed = 1
          AND issue_status = ?
        ORDER BY issue_priority DESC, id
        "#
    );
    let mrs = sqlx::query_as::<_, MergeRequest>(&sql)
        .bind(author_id)
        .bind(IssueStatus::OnReview)
        .fetch_all(pool)
        .await?;

    Ok(mrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::initialize;
    use crate::models::IssuePriority;
    use tempfile::tempdir;

    fn new_mr(iid: i64) -> NewMergeRequest {
        NewMergeRequest {
            gitlab_iid: iid,
            url: format!("https://gitlab.com/team/repo/-/merge_requests/{}", iid),
            title: format!("[NC-{}] change", iid),
            author_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_sets_follow_up_flags() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db")).await.unwrap();

        let mr = create_mr(&pool, &new_mr(7)).await.unwrap();
        assert!(!mr.is_closed);
        assert!(mr.needs_qa_notify);
        assert!(mr.needs_tracker_refresh);
        assert!(mr.labels_vec().is_empty());

        let fetched = get_mr_by_gitlab_iid(&pool, 7).await.unwrap().unwrap();
        assert_eq!(fetched, mr);
    }

    #[tokio::test]
    async fn test_update_round_trips_tracker_fields() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db")).await.unwrap();

        let mut mr = create_mr(&pool, &new_mr(8)).await.unwrap();
        mr.issue_id = Some(8);
        mr.issue_priority = Some(IssuePriority::High);
        mr.issue_status = Some(IssueStatus::OnReview);
        mr.needs_tracker_refresh = false;
        mr.add_label("reviewed");
        update_mr(&pool, &mr).await.unwrap();

        let fetched = get_mr(&pool, mr.id).await.unwrap().unwrap();
        assert_eq!(fetched.issue_priority, Some(IssuePriority::High));
        assert_eq!(fetched.issue_status, Some(IssueStatus::OnReview));
        assert!(!fetched.needs_tracker_refresh);
        assert_eq!(fetched.labels_vec(), vec!["reviewed".to_string()]);
    }

    #[tokio::test]
    async fn test_close_mr_is_terminal_and_idempotent() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db")).await.unwrap();

        let mr = create_mr(&pool, &new_mr(9)).await.unwrap();
        close_mr(&pool, mr.id).await.unwrap();
        close_mr(&pool, mr.id).await.unwrap();

        let fetched = get_mr(&pool, mr.id).await.unwrap().unwrap();
        assert!(fetched.is_closed);
        assert!(fetched.closed_at.is_some());
        assert!(list_open_mrs(&pool).await.unwrap().is_empty());

        // Already closed: the batch close does not report it again
        assert!(close_mrs_with_no_pending_approvals(&pool).await.unwrap().is_empty());
    }
}
