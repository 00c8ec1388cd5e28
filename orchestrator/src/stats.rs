//! Per-project rollups computed from the test and issue population.

use crate::record::{IssueStatus, ProjectRecord};
use crate::store::{StoreResult, TestStore};
use chrono::{DateTime, Utc};
use runner::IssueSeverity;
use serde::Serialize;
use uuid::Uuid;

/// Aggregate view of a project's testing activity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    /// Every test row for the project, regardless of status
    pub total_tests: u64,
    /// Creation time of the newest test, absent when none exist
    pub latest_test: Option<DateTime<Utc>>,
    /// Issues with critical severity still in the open state
    pub open_critical_issues: u64,
}

/// A project listing entry with its summary attached
#[derive(Debug, Clone, Serialize)]
pub struct ProjectWithStats {
    #[serde(flatten)]
    pub project: ProjectRecord,
    pub total_tests: u64,
    pub latest_test: Option<DateTime<Utc>>,
    pub open_critical_issues: u64,
}

impl ProjectWithStats {
    pub fn new(project: ProjectRecord, summary: ProjectSummary) -> Self {
        Self {
            project,
            total_tests: summary.total_tests,
            latest_test: summary.latest_test,
            open_critical_issues: summary.open_critical_issues,
        }
    }
}

/// Summarize one project against a single logical snapshot of the store.
/// The read may be stale relative to in-flight transitions, but it can never
/// observe a half-written test.
pub async fn summarize(store: &dyn TestStore, project_id: Uuid) -> StoreResult<ProjectSummary> {
    let snapshot = store.project_snapshot(project_id).await?;

    let total_tests = snapshot.tests.len() as u64;
    let latest_test = snapshot.tests.iter().map(|t| t.created_at).max();
    let open_critical_issues = snapshot
        .issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Critical && i.status == IssueStatus::Open)
        .count() as u64;

    Ok(ProjectSummary {
        total_tests,
        latest_test,
        open_critical_issues,
    })
}
