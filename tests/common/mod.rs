//! Shared harness for integration tests.
//!
//! A real SQLite database in a temp directory, plus in-memory stand-ins for
//! GitLab, Jira and Telegram that record what the engines asked of them.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::FixedOffset;
use chrono::NaiveTime;
use review_party_lib::db;
use review_party_lib::error::AppError;
use review_party_lib::models::{MergeRequest, NewMergeRequest, NewReviewer, Reviewer, Role};
use review_party_lib::services::escalation::Escalation;
use review_party_lib::services::external::{
    GitLabUserRef, IssueInfo, IssueTracker, MergeRequestInfo, Notifier, SourceControl,
};
use review_party_lib::services::{Engine, EngineSettings, Repository, SqliteRepository};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct FakeMergeRequest {
    pub info: MergeRequestInfo,
    pub approvers: HashSet<i64>,
    pub comments: HashMap<i64, bool>,
}

#[derive(Default)]
pub struct FakeSourceControl {
    pub mrs: Mutex<HashMap<i64, FakeMergeRequest>>,
    pub users: Mutex<Vec<GitLabUserRef>>,
    pub failing: Mutex<HashSet<i64>>,
    pub hanging: Mutex<HashSet<i64>>,
    pub labels: Mutex<Vec<(i64, String)>>,
    pub written_reviewers: Mutex<HashMap<i64, Vec<String>>>,
}

impl FakeSourceControl {
    pub fn add_mr(&self, iid: i64, title: &str, author_id: i64) {
        self.mrs.lock().unwrap().insert(
            iid,
            FakeMergeRequest {
                info: MergeRequestInfo {
                    iid,
                    title: title.to_string(),
                    state: "opened".to_string(),
                    author_id,
                    web_url: mr_url(iid),
                },
                approvers: HashSet::new(),
                comments: HashMap::new(),
            },
        );
    }

    pub fn approve(&self, iid: i64, gitlab_id: i64) {
        if let Some(mr) = self.mrs.lock().unwrap().get_mut(&iid) {
            mr.approvers.insert(gitlab_id);
        }
    }

    pub fn comment(&self, iid: i64, gitlab_id: i64, unresolved: bool) {
        if let Some(mr) = self.mrs.lock().unwrap().get_mut(&iid) {
            mr.comments.insert(gitlab_id, unresolved);
        }
    }

    pub fn set_state(&self, iid: i64, state: &str) {
        if let Some(mr) = self.mrs.lock().unwrap().get_mut(&iid) {
            mr.info.state = state.to_string();
        }
    }

    pub fn fail(&self, iid: i64) {
        self.failing.lock().unwrap().insert(iid);
    }

    pub fn hang(&self, iid: i64) {
        self.hanging.lock().unwrap().insert(iid);
    }

    pub fn labels_for(&self, iid: i64) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == iid)
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn reviewers_for(&self, iid: i64) -> Option<Vec<String>> {
        self.written_reviewers.lock().unwrap().get(&iid).cloned()
    }

    async fn check(&self, iid: i64) -> Result<FakeMergeRequest, AppError> {
        let hang = self.hanging.lock().unwrap().contains(&iid);
        if hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.lock().unwrap().contains(&iid) {
            return Err(AppError::gitlab_api_full("Internal Server Error", 500, "/fake"));
        }
        self.mrs
            .lock()
            .unwrap()
            .get(&iid)
            .cloned()
            .ok_or_else(|| AppError::gitlab_api_full("Resource not found", 404, "/fake"))
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn get_merge_request(&self, iid: i64) -> Result<MergeRequestInfo, AppError> {
        Ok(self.check(iid).await?.info)
    }

    async fn users_who_approved(&self, iid: i64) -> Result<HashSet<i64>, AppError> {
        Ok(self.check(iid).await?.approvers)
    }

    async fn users_with_comment_state(&self, iid: i64) -> Result<HashMap<i64, bool>, AppError> {
        Ok(self.check(iid).await?.comments)
    }

    async fn set_label(&self, iid: i64, label: &str) -> Result<(), AppError> {
        self.check(iid).await?;
        self.labels.lock().unwrap().push((iid, label.to_string()));
        Ok(())
    }

    async fn write_reviewers(&self, iid: i64, usernames: &[String]) -> Result<(), AppError> {
        self.written_reviewers
            .lock()
            .unwrap()
            .insert(iid, usernames.to_vec());
        Ok(())
    }

    async fn find_user(&self, ident: &str) -> Result<GitLabUserRef, AppError> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.username == ident || u.id.to_string() == ident)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("GitLab user", ident))
    }
}

#[derive(Default)]
pub struct FakeTracker {
    pub issues: Mutex<HashMap<i64, IssueInfo>>,
    pub calls: Mutex<Vec<i64>>,
}

impl FakeTracker {
    pub fn set(&self, issue_id: i64, info: IssueInfo) {
        self.issues.lock().unwrap().insert(issue_id, info);
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn load_issue_status(&self, issue_id: i64) -> Result<IssueInfo, AppError> {
        self.calls.lock().unwrap().push(issue_id);
        self.issues
            .lock()
            .unwrap()
            .get(&issue_id)
            .copied()
            .ok_or_else(|| AppError::issue_tracker(format!("NC-{} not found", issue_id)))
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    /// (recipient, text); broadcasts have no recipient.
    pub sent: Mutex<Vec<(Option<String>, String)>>,
}

impl FakeNotifier {
    pub fn direct_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.as_deref() == Some(recipient))
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.is_none())
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, recipient: &str, text: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((Some(recipient.to_string()), text.to_string()));
        Ok(())
    }

    async fn broadcast(&self, text: &str) -> Result<(), AppError> {
        self.sent.lock().unwrap().push((None, text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub _dir: TempDir,
    pub engine: Engine,
    pub repo: Arc<SqliteRepository>,
    pub source: Arc<FakeSourceControl>,
    pub tracker: Arc<FakeTracker>,
    pub notifier: Arc<FakeNotifier>,
}

pub fn settings(dev: usize, lead: usize) -> EngineSettings {
    EngineSettings {
        quotas: vec![(Role::Developer, dev), (Role::Lead, lead)],
        reviewed_label: "reviewed".to_string(),
        project_key: "NC".to_string(),
        tracker_enabled: true,
        escalation: Escalation::new(DAY, FixedOffset::east_opt(0).unwrap()),
        digest_after: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        call_timeout: Duration::from_millis(200),
        allow_manual_digest: false,
    }
}

pub async fn harness(dev: usize, lead: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("test.db")).await.unwrap();

    let repo = Arc::new(SqliteRepository::new(pool));
    let source = Arc::new(FakeSourceControl::default());
    let tracker = Arc::new(FakeTracker::default());
    let notifier = Arc::new(FakeNotifier::default());

    let engine = Engine::new(
        repo.clone(),
        source.clone(),
        tracker.clone(),
        notifier.clone(),
        settings(dev, lead),
    );

    Harness {
        _dir: dir,
        engine,
        repo,
        source,
        tracker,
        notifier,
    }
}

pub fn mr_url(iid: i64) -> String {
    format!("https://gitlab.example.com/team/app/-/merge_requests/{}", iid)
}

impl Harness {
    /// Register a reviewer directly, without a GitLab lookup.
    pub async fn reviewer(&self, name: &str, gitlab_id: i64, role: Role) -> Reviewer {
        self.repo
            .create_reviewer(&NewReviewer {
                chat_username: name.to_string(),
                gitlab_id,
                gitlab_username: format!("gl-{}", name),
                role,
            })
            .await
            .unwrap()
    }

    /// Track a merge request and give it reviews, bypassing selection.
    pub async fn tracked_mr(
        &self,
        iid: i64,
        title: &str,
        author: Option<&Reviewer>,
        party: &[&Reviewer],
        at: i64,
    ) -> MergeRequest {
        self.source
            .add_mr(iid, title, author.map(|a| a.gitlab_id).unwrap_or(9999));
        let mr = self
            .repo
            .create_mr(&NewMergeRequest {
                gitlab_iid: iid,
                url: mr_url(iid),
                title: title.to_string(),
                author_id: author.map(|a| a.id),
            })
            .await
            .unwrap();
        for reviewer in party {
            self.repo.create_review(mr.id, reviewer.id, at).await.unwrap();
        }
        mr
    }

    pub async fn mr(&self, id: i64) -> MergeRequest {
        self.repo.get_mr_by_id(id).await.unwrap().unwrap()
    }

    pub async fn payload(&self, reviewer: &Reviewer) -> i64 {
        self.repo
            .get_workload(reviewer.id)
            .await
            .unwrap()
            .unwrap()
            .payload
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
