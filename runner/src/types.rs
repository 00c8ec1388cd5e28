use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Opaque structured payload used for test configuration, run results, and
/// issue metadata. The orchestrator never parses these eagerly; a consumer
/// that expects a specific shape validates at its own boundary.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The kinds of automated tests the engine can run against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Every check the engine supports
    Full,
    /// Login/session handling checks
    Auth,
    /// Load-time and responsiveness checks
    Performance,
    /// Header, TLS, and injection-surface checks
    Security,
    /// Layout and accessibility checks
    Ui,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Full => "full",
            TestType::Auth => "auth",
            TestType::Performance => "performance",
            TestType::Security => "security",
            TestType::Ui => "ui",
        }
    }

    pub fn all() -> [TestType; 5] {
        [
            TestType::Full,
            TestType::Auth,
            TestType::Performance,
            TestType::Security,
            TestType::Ui,
        ]
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a submitted test type string is not recognized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized test type: {0}")]
pub struct UnknownTestType(pub String);

impl FromStr for TestType {
    type Err = UnknownTestType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(TestType::Full),
            "auth" => Ok(TestType::Auth),
            "performance" => Ok(TestType::Performance),
            "security" => Ok(TestType::Security),
            "ui" => Ok(TestType::Ui),
            other => Err(UnknownTestType(other.to_string())),
        }
    }
}

/// Severity assigned to an issue discovered during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Critical => write!(f, "critical"),
            IssueSeverity::High => write!(f, "high"),
            IssueSeverity::Medium => write!(f, "medium"),
            IssueSeverity::Low => write!(f, "low"),
            IssueSeverity::Info => write!(f, "info"),
        }
    }
}

/// One execution request handed to a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// URL of the site under test
    pub target_url: String,
    /// Which suite of checks to run
    pub test_type: TestType,
    /// Freeform engine configuration (credentials, browser choice, timeouts)
    pub config: Option<JsonMap>,
}

impl RunRequest {
    pub fn new(target_url: impl Into<String>, test_type: TestType) -> Self {
        Self {
            target_url: target_url.into(),
            test_type,
            config: None,
        }
    }

    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.config = Some(config);
        self
    }
}

/// A defect found by the engine during a run, reported alongside the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredIssue {
    pub severity: IssueSeverity,
    pub category: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub screenshot: Option<String>,
    pub recommendation: Option<String>,
}

impl DiscoveredIssue {
    pub fn new(
        severity: IssueSeverity,
        category: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            title: title.into(),
            description: None,
            url: None,
            screenshot: None,
            recommendation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Terminal result of one execution attempt.
///
/// The outcome value is the only channel between an engine and the
/// orchestrator: runners never write to the record store themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The run finished; results may still contain failing checks
    Success {
        results: JsonMap,
        screenshots: Vec<String>,
        videos: Vec<String>,
        issues: Vec<DiscoveredIssue>,
    },
    /// The run itself errored out before producing results
    Failure {
        error_message: String,
        error_stack: Option<String>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}
