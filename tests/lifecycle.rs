//! Sync, close and tracker refresh passes.

mod common;

use chrono::{TimeZone, Utc};
use common::{harness, mr_url, now, DAY};
use review_party_lib::models::{IssuePriority, IssueStatus, NewMergeRequest, Role};
use review_party_lib::services::external::IssueInfo;
use review_party_lib::services::Repository;

#[tokio::test]
async fn test_closes_only_when_every_reviewer_approved() {
    let h = harness(2, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let b = h.reviewer("b", 2, Role::Developer).await;
    let mr = h.tracked_mr(20, "no ticket", None, &[&a, &b], now()).await;

    h.source.approve(20, a.gitlab_id);
    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.closed, 0);
    assert!(!h.mr(mr.id).await.is_closed);
    assert_eq!(h.payload(&a).await, 0);
    assert_eq!(h.payload(&b).await, 1);

    h.source.approve(20, b.gitlab_id);
    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.closed, 1);

    let closed = h.mr(mr.id).await;
    assert!(closed.is_closed);
    assert_eq!(closed.labels_vec(), vec!["reviewed".to_string()]);
    assert_eq!(h.source.labels_for(20), vec!["reviewed".to_string()]);

    // Closed MRs are left alone by later passes
    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.synced, 0);
    assert_eq!(report.closed, 0);
}

#[tokio::test]
async fn test_mr_without_reviews_closes() {
    let h = harness(1, 0).await;
    let mr = h.tracked_mr(21, "orphan", None, &[], now()).await;

    let closed = h.engine.close_reviewed().await.unwrap();
    assert_eq!(closed.len(), 1);
    assert!(h.mr(mr.id).await.is_closed);
}

#[tokio::test]
async fn test_upstream_close_wins_over_pending_reviews() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let mr = h.tracked_mr(22, "merged elsewhere", None, &[&a], now()).await;
    h.source.set_state(22, "merged");

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.force_closed, 1);
    assert!(h.mr(mr.id).await.is_closed);

    // Force close skips the label
    assert!(h.source.labels_for(22).is_empty());
}

#[tokio::test]
async fn test_signals_from_outsiders_are_ignored() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let outsider = h.reviewer("outsider", 2, Role::Developer).await;
    let mr = h.tracked_mr(23, "x", None, &[&a], now()).await;

    h.source.approve(23, outsider.gitlab_id);
    h.source.approve(23, 5555);
    h.source.comment(23, a.gitlab_id, true);

    h.engine.sync_all().await.unwrap();

    let reviews = h.repo.list_reviews_for_mr(mr.id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(!reviews[0].approved);
    assert!(reviews[0].commented);
    assert!(!h.mr(mr.id).await.is_closed);
}

#[tokio::test]
async fn test_resolved_threads_clear_comment_flag() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let mr = h.tracked_mr(24, "x", None, &[&a], now()).await;

    h.source.comment(24, a.gitlab_id, true);
    h.engine.sync_all().await.unwrap();
    assert!(h.repo.list_reviews_for_mr(mr.id).await.unwrap()[0].commented);

    h.source.comment(24, a.gitlab_id, false);
    h.engine.sync_all().await.unwrap();
    assert!(!h.repo.list_reviews_for_mr(mr.id).await.unwrap()[0].commented);
}

#[tokio::test]
async fn test_one_failing_mr_does_not_stop_the_batch() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let first = h.tracked_mr(30, "x", None, &[&a], now()).await;
    let broken = h.tracked_mr(31, "x", None, &[&a], now()).await;
    let last = h.tracked_mr(32, "x", None, &[&a], now()).await;

    h.source.fail(31);
    h.source.approve(30, a.gitlab_id);
    h.source.approve(31, a.gitlab_id);
    h.source.approve(32, a.gitlab_id);

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, vec![broken.id]);
    assert_eq!(report.closed, 2);

    assert!(h.mr(first.id).await.is_closed);
    assert!(!h.mr(broken.id).await.is_closed);
    assert!(h.mr(last.id).await.is_closed);
}

#[tokio::test]
async fn test_hanging_call_is_bounded() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let stuck = h.tracked_mr(33, "x", None, &[&a], now()).await;
    let fine = h.tracked_mr(34, "x", None, &[&a], now()).await;

    h.source.hang(33);
    h.source.approve(34, a.gitlab_id);

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.failed, vec![stuck.id]);
    assert!(h.mr(fine.id).await.is_closed);
}

#[tokio::test]
async fn test_author_gets_qa_notice_on_close() {
    let h = harness(1, 0).await;
    let author = h.reviewer("author", 1, Role::Developer).await;
    let a = h.reviewer("a", 2, Role::Developer).await;
    let mr = h
        .tracked_mr(40, "[NC-40] checkout", Some(&author), &[&a], now())
        .await;
    h.tracker.set(
        40,
        IssueInfo {
            priority: IssuePriority::High,
            status: IssueStatus::OnReview,
        },
    );
    h.source.approve(40, a.gitlab_id);

    h.engine.sync_all().await.unwrap();

    let closed = h.mr(mr.id).await;
    assert!(closed.is_closed);
    assert_eq!(closed.issue_id, Some(40));
    assert_eq!(closed.issue_priority, Some(IssuePriority::High));
    assert!(closed.needs_tracker_refresh);
    assert!(!closed.needs_qa_notify);

    let notices = h.notifier.direct_to("author");
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("QA"));
}

#[tokio::test]
async fn test_no_qa_notice_when_ticket_moved_on() {
    let h = harness(1, 0).await;
    let author = h.reviewer("author", 1, Role::Developer).await;
    let a = h.reviewer("a", 2, Role::Developer).await;
    let mr = h
        .tracked_mr(41, "[NC-41] checkout", Some(&author), &[&a], now())
        .await;
    h.tracker.set(
        41,
        IssueInfo {
            priority: IssuePriority::Low,
            status: IssueStatus::Testing,
        },
    );
    h.source.approve(41, a.gitlab_id);

    h.engine.sync_all().await.unwrap();

    assert!(h.mr(mr.id).await.needs_qa_notify);
    assert!(h.notifier.direct_to("author").is_empty());
}

#[tokio::test]
async fn test_tracker_refresh_stops_without_ticket_key() {
    let h = harness(1, 0).await;
    let mr = h.tracked_mr(50, "chore: bump deps", None, &[], now()).await;

    let refreshed = h.engine.refresh_all_trackers().await.unwrap();
    assert_eq!(refreshed, 1);

    let mr = h.mr(mr.id).await;
    assert_eq!(mr.issue_id, None);
    assert!(!mr.needs_tracker_refresh);
    assert!(h.tracker.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tracker_refresh_stops_on_terminal_status() {
    let h = harness(1, 0).await;
    let mr = h.tracked_mr(51, "[NC-51] feature", None, &[], now()).await;
    h.tracker.set(
        51,
        IssueInfo {
            priority: IssuePriority::Medium,
            status: IssueStatus::InProgress,
        },
    );

    h.engine.refresh_all_trackers().await.unwrap();
    let current = h.mr(mr.id).await;
    assert_eq!(current.issue_status, Some(IssueStatus::InProgress));
    assert!(current.needs_tracker_refresh);

    h.tracker.set(
        51,
        IssueInfo {
            priority: IssuePriority::Medium,
            status: IssueStatus::Done,
        },
    );
    h.engine.refresh_all_trackers().await.unwrap();
    let current = h.mr(mr.id).await;
    assert_eq!(current.issue_status, Some(IssueStatus::Done));
    assert!(!current.needs_tracker_refresh);

    assert!(h.repo.list_mrs_needing_tracker_refresh().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tracker_failure_is_skipped() {
    let h = harness(1, 0).await;
    let unknown = h.tracked_mr(52, "[NC-52] missing ticket", None, &[], now()).await;
    let known = h.tracked_mr(53, "[NC-53] ok", None, &[], now()).await;
    h.tracker.set(
        53,
        IssueInfo {
            priority: IssuePriority::Low,
            status: IssueStatus::Merged,
        },
    );

    let refreshed = h.engine.refresh_all_trackers().await.unwrap();
    assert_eq!(refreshed, 1);
    assert!(h.mr(unknown.id).await.needs_tracker_refresh);
    assert!(!h.mr(known.id).await.needs_tracker_refresh);
}

fn at(y: i32, m: u32, d: u32, h: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
}

#[tokio::test]
async fn test_new_cycle_is_not_closed_by_the_next_sync() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    h.source.add_mr(60, "fresh", 9999);

    let (mr, party) = h
        .engine
        .create_review_cycle(&NewMergeRequest {
            gitlab_iid: 60,
            url: mr_url(60),
            title: "fresh".to_string(),
            author_id: None,
        })
        .await
        .unwrap();
    assert_eq!(party.len(), 1);

    let report = h.engine.sync_all().await.unwrap();
    assert_eq!(report.closed, 0);
    assert!(!h.mr(mr.id).await.is_closed);
    assert!(h.source.labels_for(60).is_empty());
    assert_eq!(h.payload(&a).await, 1);
}

#[tokio::test]
async fn test_party_insert_is_all_or_nothing() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let input = NewMergeRequest {
        gitlab_iid: 61,
        url: mr_url(61),
        title: "dup".to_string(),
        author_id: None,
    };

    // Second insert for the same pair violates the active-review index
    let result = h.repo.create_mr_with_party(&input, &[a.id, a.id], now()).await;
    assert!(result.is_err());

    assert!(h.repo.get_mr_by_gitlab_iid(61).await.unwrap().is_none());
    assert!(h.repo.list_open_mrs().await.unwrap().is_empty());
    assert_eq!(h.payload(&a).await, 0);

    let mr = h.repo.create_mr_with_party(&input, &[a.id], now()).await.unwrap();
    assert_eq!(h.repo.list_reviews_for_mr(mr.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sync_stamps_only_changed_flags() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let b = h.reviewer("b", 2, Role::Developer).await;
    let thursday = at(2024, 1, 11, 9);
    let mr = h.tracked_mr(62, "x", None, &[&a, &b], thursday).await;

    // Friday evening + one day lands on Saturday, so the deadline moves to
    // Monday and the stored stamp is Sunday at the same hour.
    h.source.comment(62, a.gitlab_id, true);
    h.engine.sync_all_at(at(2024, 1, 12, 18)).await.unwrap();

    let reviews = h.repo.list_reviews_for_mr(mr.id).await.unwrap();
    let review_a = reviews.iter().find(|r| r.reviewer_id == a.id).unwrap();
    let review_b = reviews.iter().find(|r| r.reviewer_id == b.id).unwrap();
    assert!(review_a.commented);
    assert_eq!(review_a.updated_at, at(2024, 1, 14, 18));
    assert_eq!(review_b.updated_at, thursday);

    // Same signals on Tuesday: nothing flips, nothing is re-stamped
    let tuesday = at(2024, 1, 16, 10);
    h.engine.sync_all_at(tuesday).await.unwrap();
    let reviews = h.repo.list_reviews_for_mr(mr.id).await.unwrap();
    let review_a = reviews.iter().find(|r| r.reviewer_id == a.id).unwrap();
    assert_eq!(review_a.updated_at, at(2024, 1, 14, 18));

    // An approval on a weekday is stamped as received
    h.source.approve(62, a.gitlab_id);
    h.engine.sync_all_at(tuesday).await.unwrap();
    let reviews = h.repo.list_reviews_for_mr(mr.id).await.unwrap();
    let review_a = reviews.iter().find(|r| r.reviewer_id == a.id).unwrap();
    assert!(review_a.approved);
    assert_eq!(review_a.updated_at, tuesday);
    assert!(h.engine.settings.escalation.is_overdue(review_a.updated_at, tuesday + DAY + 1));
}
