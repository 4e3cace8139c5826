//! Daily digest content and scheduling.

mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use common::{harness, DAY};
use review_party_lib::error::AppError;
use review_party_lib::models::{IssuePriority, IssueStatus, Role};
use review_party_lib::services::digest::DigestSchedule;
use review_party_lib::services::Repository;

fn at(y: i32, m: u32, d: u32, h: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
}

#[tokio::test]
async fn test_overdue_reviews_by_priority() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let monday = at(2024, 1, 15, 12);

    let low = h.tracked_mr(1, "[NC-1] low", None, &[&a], monday - 3 * DAY).await;
    let high = h.tracked_mr(2, "[NC-2] high", None, &[&a], monday - 2 * DAY).await;
    let fresh = h.tracked_mr(3, "[NC-3] fresh", None, &[&a], monday - DAY / 2).await;

    for (mr, priority) in [(&low, IssuePriority::Low), (&high, IssuePriority::Highest)] {
        let mut mr = h.mr(mr.id).await;
        mr.issue_priority = Some(priority);
        h.repo.update_mr(&mr).await.unwrap();
    }

    let entries = h.engine.build_digest(monday).await.unwrap();
    assert_eq!(entries.len(), 1);

    let urls: Vec<&str> = entries[0].overdue.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec![high.url.as_str(), low.url.as_str()]);
    assert!(!urls.contains(&fresh.url.as_str()));
}

#[tokio::test]
async fn test_approved_and_inactive_are_left_out() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let b = h.reviewer("b", 2, Role::Developer).await;
    let monday = at(2024, 1, 15, 12);
    let old = monday - 5 * DAY;

    let mr = h.tracked_mr(10, "x", None, &[&a, &b], old).await;
    h.repo.update_review_approval(mr.id, a.id, true, old).await.unwrap();
    h.repo.set_reviewer_active(b.id, false).await.unwrap();

    assert!(h.engine.build_digest(monday).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_on_review_mrs_remind_the_author() {
    let h = harness(1, 0).await;
    let author = h.reviewer("author", 1, Role::Developer).await;
    let a = h.reviewer("a", 2, Role::Developer).await;
    let monday = at(2024, 1, 15, 12);

    let mr = h
        .tracked_mr(20, "[NC-20] done", Some(&author), &[&a], monday)
        .await;
    let mut stored = h.mr(mr.id).await;
    stored.issue_status = Some(IssueStatus::OnReview);
    h.repo.update_mr(&stored).await.unwrap();
    h.repo.update_review_approval(mr.id, a.id, true, monday).await.unwrap();
    h.repo.close_mrs_with_no_pending_approvals().await.unwrap();

    let entries = h.engine.build_digest(monday).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reviewer.id, author.id);
    assert_eq!(entries[0].qa_reminders.len(), 1);
    assert!(entries[0].render().contains("move the ticket to QA"));
}

#[tokio::test]
async fn test_digest_goes_out_once_per_working_day() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let monday_morning = at(2024, 1, 15, 9);
    h.tracked_mr(30, "x", None, &[&a], monday_morning - 3 * DAY).await;

    let mut schedule = DigestSchedule::default();

    // Before 10:00
    assert!(!h.engine.run_digest_if_due(&mut schedule, monday_morning).await.unwrap());
    assert!(h.notifier.direct_to("a").is_empty());

    let monday_late = at(2024, 1, 15, 11);
    assert!(h.engine.run_digest_if_due(&mut schedule, monday_late).await.unwrap());
    assert!(!h.engine.run_digest_if_due(&mut schedule, monday_late + 3600).await.unwrap());
    assert_eq!(h.notifier.direct_to("a").len(), 1);

    // Survives a restart
    let persisted = h.engine.load_digest_schedule().await.unwrap();
    assert_eq!(persisted.last_sent, NaiveDate::from_ymd_opt(2024, 1, 15));

    // Saturday is skipped, next Monday is not
    let saturday = at(2024, 1, 20, 11);
    assert!(!h.engine.run_digest_if_due(&mut schedule, saturday).await.unwrap());
    let next_monday = at(2024, 1, 22, 11);
    assert!(h.engine.run_digest_if_due(&mut schedule, next_monday).await.unwrap());
}

#[tokio::test]
async fn test_manual_digest_needs_opt_in() {
    let h = harness(1, 0).await;
    let a = h.reviewer("a", 1, Role::Developer).await;
    let monday = at(2024, 1, 15, 12);
    h.tracked_mr(30, "x", None, &[&a], monday - 3 * DAY).await;

    let err = h.engine.send_digest_on_request(monday).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput { .. }));
    assert!(h.notifier.direct_to("a").is_empty());

    let mut engine = h.engine.clone();
    engine.settings.allow_manual_digest = true;
    assert_eq!(engine.send_digest_on_request(monday).await.unwrap(), 1);
    assert_eq!(h.notifier.direct_to("a").len(), 1);
}
