//! Service facade consumed by the API layer.
//!
//! Every operation takes the requesting user's id and enforces ownership:
//! a project or test that does not exist, is not owned by the caller, or
//! (for projects) has been soft-deleted surfaces as `NotFound`.

use crate::dispatch::{DispatchError, Dispatcher, TestEvent};
use crate::record::{
    IssueDraft, IssueRecord, ManualSubmission, ManualTestRecord, ProjectRecord, ProjectStatus,
    TestRecord, TestSubmission,
};
use crate::stats::{self, ProjectSummary, ProjectWithStats};
use crate::store::{StoreError, TestStore};
use runner::TestType;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The referenced entity does not exist or is not owned by the requester
    #[error("{kind} not found")]
    NotFound { kind: &'static str },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, .. } => ServiceError::NotFound { kind },
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// The boundary the route layer talks to
#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn TestStore>,
    dispatcher: Arc<Dispatcher>,
}

impl TestService {
    pub fn new(store: Arc<dyn TestStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub async fn create_project(&self, project: ProjectRecord) -> ServiceResult<ProjectRecord> {
        self.store.insert_project(project.clone()).await?;
        info!("Project {} created for user {}", project.id, project.user_id);
        Ok(project)
    }

    /// All non-deleted projects of `user_id`, each with its summary attached
    pub async fn list_projects(&self, user_id: Uuid) -> ServiceResult<Vec<ProjectWithStats>> {
        let projects = self.store.list_projects(user_id).await?;
        let mut listed = Vec::with_capacity(projects.len());
        for project in projects {
            let summary = stats::summarize(self.store.as_ref(), project.id).await?;
            listed.push(ProjectWithStats::new(project, summary));
        }
        Ok(listed)
    }

    /// Create and start a new test. Returns the pending record; execution
    /// happens asynchronously.
    pub async fn submit_test(
        &self,
        user_id: Uuid,
        submission: TestSubmission,
    ) -> ServiceResult<TestRecord> {
        let test_type: TestType =
            submission
                .test_type
                .parse()
                .map_err(|err: runner::UnknownTestType| ServiceError::InvalidArgument {
                    message: err.to_string(),
                })?;
        let project = self.owned_project(user_id, submission.project_id).await?;

        let test = self
            .dispatcher
            .submit(&project, test_type, submission.config)
            .await?;
        Ok(test)
    }

    /// Current state of a test, including whichever of results, errors, and
    /// media are populated at the time of the read
    pub async fn get_test(&self, user_id: Uuid, test_id: Uuid) -> ServiceResult<TestRecord> {
        self.owned_test(user_id, test_id).await
    }

    pub async fn cancel_test(&self, user_id: Uuid, test_id: Uuid) -> ServiceResult<TestRecord> {
        self.owned_test(user_id, test_id).await?;
        Ok(self.dispatcher.cancel(test_id).await?)
    }

    pub async fn list_test_issues(
        &self,
        user_id: Uuid,
        test_id: Uuid,
    ) -> ServiceResult<Vec<IssueRecord>> {
        self.owned_test(user_id, test_id).await?;
        Ok(self.store.issues_for_test(test_id).await?)
    }

    /// Record an issue reported by a human reviewer
    pub async fn report_issue(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        draft: IssueDraft,
    ) -> ServiceResult<IssueRecord> {
        self.owned_test(user_id, test_id).await?;
        let issue = draft.into_record(test_id);
        self.store.insert_issue(issue.clone()).await?;
        info!("Issue {} reported against test {}", issue.id, test_id);
        Ok(issue)
    }

    /// Store a manual test submission. Side-channel only: the owning test's
    /// status is never touched.
    pub async fn submit_manual(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        submission: ManualSubmission,
    ) -> ServiceResult<ManualTestRecord> {
        if submission.test_data.is_empty() {
            return Err(ServiceError::InvalidArgument {
                message: "manual submission requires test_data".to_string(),
            });
        }
        self.owned_test(user_id, test_id).await?;

        let record = ManualTestRecord::from_submission(test_id, user_id, submission);
        self.store.insert_manual_result(record.clone()).await?;
        Ok(record)
    }

    pub async fn project_summary(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> ServiceResult<ProjectSummary> {
        self.owned_project(user_id, project_id).await?;
        Ok(stats::summarize(self.store.as_ref(), project_id).await?)
    }

    /// Subscribe to lifecycle events for all tests
    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.dispatcher.subscribe()
    }

    async fn owned_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> ServiceResult<ProjectRecord> {
        let project = self.store.get_project(project_id).await?;
        if project.user_id != user_id || project.status == ProjectStatus::Deleted {
            return Err(ServiceError::NotFound { kind: "project" });
        }
        Ok(project)
    }

    /// Ownership is checked through the owning project. A test whose project
    /// was soft-deleted stays readable for audit.
    async fn owned_test(&self, user_id: Uuid, test_id: Uuid) -> ServiceResult<TestRecord> {
        let test = self.store.get_test(test_id).await?;
        let project = self.store.get_project(test.project_id).await?;
        if project.user_id != user_id {
            return Err(ServiceError::NotFound { kind: "test" });
        }
        Ok(test)
    }
}
