//! Durable records for projects, tests, issues, and manual submissions.

use chrono::{DateTime, Utc};
use runner::{DiscoveredIssue, IssueSeverity, JsonMap, TestType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Execution status of one test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TestStatus {
    /// Whether no further transitions are permitted from this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Completed | TestStatus::Failed | TestStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pending => write!(f, "pending"),
            TestStatus::Running => write!(f, "running"),
            TestStatus::Completed => write!(f, "completed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle status of a project. Deletion is soft only: a deleted project
/// disappears from listings while its tests and issues are retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
    Deleted,
}

/// Review status of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Acknowledged,
    Fixed,
    WontFix,
}

/// A registered target site owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub target_url: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    /// Freeform test preferences applied when a submission carries no config
    pub test_config: Option<JsonMap>,
    pub created_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(user_id: Uuid, name: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            target_url: target_url.into(),
            description: None,
            status: ProjectStatus::Active,
            test_config: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_test_config(mut self, test_config: JsonMap) -> Self {
        self.test_config = Some(test_config);
        self
    }
}

/// One test run and its terminal results.
///
/// Invariants, enforced by the state machine in [`crate::state`]:
/// `results` is populated iff the status is completed; `error_message` iff
/// failed; `completed_at` and `duration_seconds` are set together exactly
/// once, on entry into a terminal state reached from running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub test_type: TestType,
    pub status: TestStatus,
    pub results: Option<JsonMap>,
    pub screenshots: Vec<String>,
    pub videos: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every committed transition; optimistic-locking seam for
    /// store backends that need it
    pub version: u64,
}

impl TestRecord {
    pub fn new(project_id: Uuid, test_type: TestType) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            test_type,
            status: TestStatus::Pending,
            results: None,
            screenshots: Vec::new(),
            videos: Vec::new(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            error_message: None,
            error_stack: None,
            created_at: Utc::now(),
            version: 1,
        }
    }
}

/// A defect discovered during or reported against a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: Uuid,
    pub test_id: Uuid,
    pub severity: IssueSeverity,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub element_selector: Option<String>,
    pub screenshot_url: Option<String>,
    pub code_snippet: Option<String>,
    pub status: IssueStatus,
    pub metadata: Option<JsonMap>,
    pub created_at: DateTime<Utc>,
}

impl IssueRecord {
    pub fn new(
        test_id: Uuid,
        severity: IssueSeverity,
        category: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id,
            severity,
            category: category.into(),
            title: title.into(),
            description: None,
            url: None,
            element_selector: None,
            screenshot_url: None,
            code_snippet: None,
            status: IssueStatus::Open,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Build an issue row from an engine-discovered defect. The engine's
    /// recommendation, when present, lands in the metadata map.
    pub fn from_discovered(test_id: Uuid, found: DiscoveredIssue) -> Self {
        let mut issue = Self::new(test_id, found.severity, found.category, found.title);
        issue.description = found.description;
        issue.url = found.url;
        issue.screenshot_url = found.screenshot;
        if let Some(recommendation) = found.recommendation {
            let mut metadata = JsonMap::new();
            metadata.insert("recommendation".to_string(), Value::from(recommendation));
            issue.metadata = Some(metadata);
        }
        issue
    }
}

/// Human-reviewer input for creating an issue
#[derive(Debug, Clone, Deserialize)]
pub struct IssueDraft {
    pub severity: IssueSeverity,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub element_selector: Option<String>,
    pub screenshot_url: Option<String>,
    pub code_snippet: Option<String>,
    pub metadata: Option<JsonMap>,
}

impl IssueDraft {
    pub fn into_record(self, test_id: Uuid) -> IssueRecord {
        let mut issue = IssueRecord::new(test_id, self.severity, self.category, self.title);
        issue.description = self.description;
        issue.url = self.url;
        issue.element_selector = self.element_selector;
        issue.screenshot_url = self.screenshot_url;
        issue.code_snippet = self.code_snippet;
        issue.metadata = self.metadata;
        issue
    }
}

/// Side-channel record of a human-run test session. Never participates in the
/// test state machine and never changes `TestRecord::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTestRecord {
    pub id: Uuid,
    pub test_id: Uuid,
    pub user_id: Uuid,
    pub test_data: JsonMap,
    pub screenshots: Vec<String>,
    pub videos: Vec<String>,
    pub test_duration_seconds: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

/// Payload of a manual-test submission
#[derive(Debug, Clone, Deserialize)]
pub struct ManualSubmission {
    pub test_data: JsonMap,
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    pub test_duration_seconds: Option<i64>,
}

impl ManualTestRecord {
    pub fn from_submission(test_id: Uuid, user_id: Uuid, submission: ManualSubmission) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id,
            user_id,
            test_data: submission.test_data,
            screenshots: submission.screenshots,
            videos: submission.videos,
            test_duration_seconds: submission.test_duration_seconds,
            submitted_at: Utc::now(),
        }
    }
}

/// Request to create and start a new test. The test type arrives as a raw
/// string and is validated at the service boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct TestSubmission {
    pub project_id: Uuid,
    pub test_type: String,
    pub config: Option<JsonMap>,
}
