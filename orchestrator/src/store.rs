//! Test record store.
//!
//! The store is the single source of truth for test state. Transitions are
//! applied under one write guard: the current persisted status is validated
//! against the lifecycle table before the whole record is replaced, so an
//! out-of-order or duplicate terminal write is rejected and no reader ever
//! observes a half-written record.

use crate::record::{
    IssueRecord, ManualTestRecord, ProjectRecord, ProjectStatus, TestRecord, TestStatus,
};
use crate::state::{self, Transition, TransitionError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The backing store cannot be reached; fatal on the dispatch path
    #[error("record store unavailable: {reason}")]
    Unavailable { reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One logical snapshot of a project's tests and issues, read under a single
/// guard so a summary never interleaves with a transition.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    pub tests: Vec<TestRecord>,
    pub issues: Vec<IssueRecord>,
}

/// Persistence seam for test orchestration.
///
/// `apply_transition` must be atomic per test id: either the full
/// status-plus-timestamp-plus-payload update commits, or nothing does.
#[async_trait]
pub trait TestStore: Send + Sync {
    async fn insert_project(&self, project: ProjectRecord) -> StoreResult<()>;

    async fn get_project(&self, id: Uuid) -> StoreResult<ProjectRecord>;

    /// All non-deleted projects owned by `user_id`
    async fn list_projects(&self, user_id: Uuid) -> StoreResult<Vec<ProjectRecord>>;

    async fn insert_test(&self, test: TestRecord) -> StoreResult<()>;

    async fn get_test(&self, id: Uuid) -> StoreResult<TestRecord>;

    /// Validate and commit one lifecycle transition, returning the updated
    /// record. Fails with `StoreError::Transition` and writes nothing when
    /// the transition is not legal from the current persisted status.
    async fn apply_transition(
        &self,
        test_id: Uuid,
        transition: Transition,
    ) -> StoreResult<TestRecord>;

    /// Tests still awaiting execution, oldest first. Used to requeue work
    /// after a process restart.
    async fn pending_tests(&self) -> StoreResult<Vec<TestRecord>>;

    async fn insert_issue(&self, issue: IssueRecord) -> StoreResult<()>;

    async fn issues_for_test(&self, test_id: Uuid) -> StoreResult<Vec<IssueRecord>>;

    async fn insert_manual_result(&self, result: ManualTestRecord) -> StoreResult<()>;

    async fn project_snapshot(&self, project_id: Uuid) -> StoreResult<ProjectSnapshot>;
}

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, ProjectRecord>,
    tests: HashMap<Uuid, TestRecord>,
    issues: HashMap<Uuid, IssueRecord>,
    manual_results: HashMap<Uuid, ManualTestRecord>,
}

/// In-memory reference implementation of [`TestStore`]
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestStore for InMemoryStore {
    async fn insert_project(&self, project: ProjectRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.projects.insert(project.id, project);
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> StoreResult<ProjectRecord> {
        let inner = self.inner.read().await;
        inner
            .projects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "project",
                id,
            })
    }

    async fn list_projects(&self, user_id: Uuid) -> StoreResult<Vec<ProjectRecord>> {
        let inner = self.inner.read().await;
        let mut projects: Vec<ProjectRecord> = inner
            .projects
            .values()
            .filter(|p| p.user_id == user_id && p.status != ProjectStatus::Deleted)
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn insert_test(&self, test: TestRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.tests.insert(test.id, test);
        Ok(())
    }

    async fn get_test(&self, id: Uuid) -> StoreResult<TestRecord> {
        let inner = self.inner.read().await;
        inner
            .tests
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "test", id })
    }

    async fn apply_transition(
        &self,
        test_id: Uuid,
        transition: Transition,
    ) -> StoreResult<TestRecord> {
        let mut inner = self.inner.write().await;
        let current = inner
            .tests
            .get(&test_id)
            .ok_or(StoreError::NotFound {
                kind: "test",
                id: test_id,
            })?
            .clone();

        let updated = state::apply(&current, transition, Utc::now())?;
        debug!(
            "Test {} transitioned {} -> {}",
            test_id, current.status, updated.status
        );
        inner.tests.insert(test_id, updated.clone());
        Ok(updated)
    }

    async fn pending_tests(&self) -> StoreResult<Vec<TestRecord>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<TestRecord> = inner
            .tests
            .values()
            .filter(|t| t.status == TestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        Ok(pending)
    }

    async fn insert_issue(&self, issue: IssueRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.tests.contains_key(&issue.test_id) {
            return Err(StoreError::NotFound {
                kind: "test",
                id: issue.test_id,
            });
        }
        inner.issues.insert(issue.id, issue);
        Ok(())
    }

    async fn issues_for_test(&self, test_id: Uuid) -> StoreResult<Vec<IssueRecord>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<IssueRecord> = inner
            .issues
            .values()
            .filter(|i| i.test_id == test_id)
            .cloned()
            .collect();
        issues.sort_by_key(|i| i.created_at);
        Ok(issues)
    }

    async fn insert_manual_result(&self, result: ManualTestRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.tests.contains_key(&result.test_id) {
            return Err(StoreError::NotFound {
                kind: "test",
                id: result.test_id,
            });
        }
        inner.manual_results.insert(result.id, result);
        Ok(())
    }

    async fn project_snapshot(&self, project_id: Uuid) -> StoreResult<ProjectSnapshot> {
        let inner = self.inner.read().await;
        if !inner.projects.contains_key(&project_id) {
            return Err(StoreError::NotFound {
                kind: "project",
                id: project_id,
            });
        }

        let tests: Vec<TestRecord> = inner
            .tests
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        let test_ids: HashSet<Uuid> = tests.iter().map(|t| t.id).collect();
        let issues: Vec<IssueRecord> = inner
            .issues
            .values()
            .filter(|i| test_ids.contains(&i.test_id))
            .cloned()
            .collect();

        Ok(ProjectSnapshot { tests, issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner::{IssueSeverity, JsonMap, TestType};

    fn results() -> JsonMap {
        let mut map = JsonMap::new();
        map.insert("summary".to_string(), serde_json::Value::from("ok"));
        map
    }

    fn complete() -> Transition {
        Transition::Complete {
            results: results(),
            screenshots: Vec::new(),
            videos: Vec::new(),
        }
    }

    async fn store_with_test() -> (InMemoryStore, TestRecord) {
        let store = InMemoryStore::new();
        let project = ProjectRecord::new(Uuid::new_v4(), "site", "https://example.com");
        let test = TestRecord::new(project.id, TestType::Full);
        store.insert_project(project).await.unwrap();
        store.insert_test(test.clone()).await.unwrap();
        (store, test)
    }

    #[tokio::test]
    async fn transitions_commit_atomically() {
        let (store, test) = store_with_test().await;

        let running = store
            .apply_transition(test.id, Transition::Start)
            .await
            .unwrap();
        assert_eq!(running.status, TestStatus::Running);

        let completed = store.apply_transition(test.id, complete()).await.unwrap();
        assert_eq!(completed.status, TestStatus::Completed);
        assert_eq!(store.get_test(test.id).await.unwrap(), completed);
    }

    #[tokio::test]
    async fn duplicate_terminal_write_is_rejected_without_mutation() {
        let (store, test) = store_with_test().await;
        store
            .apply_transition(test.id, Transition::Start)
            .await
            .unwrap();
        let completed = store.apply_transition(test.id, complete()).await.unwrap();

        let second = store
            .apply_transition(
                test.id,
                Transition::Fail {
                    error_message: "late failure callback".to_string(),
                    error_stack: None,
                },
            )
            .await;

        assert!(matches!(second, Err(StoreError::Transition(_))));
        // record is byte-for-byte what the first terminal write produced
        assert_eq!(store.get_test(test.id).await.unwrap(), completed);
    }

    #[tokio::test]
    async fn out_of_order_terminal_write_is_rejected() {
        let (store, test) = store_with_test().await;

        let attempt = store.apply_transition(test.id, complete()).await;
        assert!(matches!(attempt, Err(StoreError::Transition(_))));

        let record = store.get_test(test.id).await.unwrap();
        assert_eq!(record.status, TestStatus::Pending);
        assert!(record.results.is_none());
    }

    #[tokio::test]
    async fn missing_test_is_not_found() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();

        let err = store.apply_transition(id, Transition::Start).await;
        assert!(matches!(err, Err(StoreError::NotFound { kind: "test", .. })));
    }

    #[tokio::test]
    async fn listings_exclude_soft_deleted_projects() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();

        let kept = ProjectRecord::new(user_id, "kept", "https://kept.example.com");
        let mut deleted = ProjectRecord::new(user_id, "gone", "https://gone.example.com");
        deleted.status = ProjectStatus::Deleted;
        let deleted_test = TestRecord::new(deleted.id, TestType::Ui);

        store.insert_project(kept.clone()).await.unwrap();
        store.insert_project(deleted.clone()).await.unwrap();
        store.insert_test(deleted_test.clone()).await.unwrap();

        let listed = store.list_projects(user_id).await.unwrap();
        assert_eq!(listed, vec![kept]);

        // audit retention: the deleted project's tests are still readable
        assert_eq!(
            store.get_test(deleted_test.id).await.unwrap(),
            deleted_test
        );
    }

    #[tokio::test]
    async fn pending_tests_come_back_oldest_first() {
        let (store, first) = store_with_test().await;
        let second = TestRecord::new(first.project_id, TestType::Auth);
        store.insert_test(second.clone()).await.unwrap();

        // a terminal test is not requeued
        let third = TestRecord::new(first.project_id, TestType::Ui);
        store.insert_test(third.clone()).await.unwrap();
        store
            .apply_transition(third.id, Transition::Cancel)
            .await
            .unwrap();

        let pending = store.pending_tests().await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn snapshot_joins_issues_through_tests() {
        let (store, test) = store_with_test().await;
        let other_project = ProjectRecord::new(Uuid::new_v4(), "other", "https://other.example");
        let other_test = TestRecord::new(other_project.id, TestType::Full);
        store.insert_project(other_project.clone()).await.unwrap();
        store.insert_test(other_test.clone()).await.unwrap();

        let ours = IssueRecord::new(test.id, IssueSeverity::Critical, "security", "XSS");
        let theirs = IssueRecord::new(other_test.id, IssueSeverity::Low, "ui", "Misaligned logo");
        store.insert_issue(ours.clone()).await.unwrap();
        store.insert_issue(theirs).await.unwrap();

        let snapshot = store.project_snapshot(test.project_id).await.unwrap();
        assert_eq!(snapshot.tests.len(), 1);
        assert_eq!(snapshot.issues, vec![ours]);
    }

    #[tokio::test]
    async fn issue_requires_existing_test() {
        let store = InMemoryStore::new();
        let orphan = IssueRecord::new(Uuid::new_v4(), IssueSeverity::High, "auth", "No lockout");

        let err = store.insert_issue(orphan).await;
        assert!(matches!(err, Err(StoreError::NotFound { kind: "test", .. })));
    }
}
