//! Deterministic stand-in for the real bot-testing engine.
//!
//! Used when no real engine is configured: waits a fixed interval and returns
//! a canned outcome. The wait runs through `tokio::time::sleep`, so a run is
//! cancellable by dropping its future.

use crate::adapter::TestRunner;
use crate::config::SimulatedRunnerConfig;
use crate::types::{DiscoveredIssue, JsonMap, RunOutcome, RunRequest};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
enum SimulatedOutcome {
    Success { issues: Vec<DiscoveredIssue> },
    Failure { message: String, stack: Option<String> },
}

/// Simulated test engine with a configurable fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedRunner {
    config: SimulatedRunnerConfig,
    outcome: SimulatedOutcome,
}

impl SimulatedRunner {
    /// A runner that always reports the canned successful run
    pub fn new(config: SimulatedRunnerConfig) -> Self {
        Self {
            config,
            outcome: SimulatedOutcome::Success { issues: Vec::new() },
        }
    }

    /// A runner that always errors out with the given message
    pub fn failing(config: SimulatedRunnerConfig, message: impl Into<String>) -> Self {
        Self {
            config,
            outcome: SimulatedOutcome::Failure {
                message: message.into(),
                stack: None,
            },
        }
    }

    /// Attach discovered issues to the canned success outcome.
    /// Has no effect on a failing runner.
    pub fn with_issues(mut self, issues: Vec<DiscoveredIssue>) -> Self {
        if let SimulatedOutcome::Success { issues: canned } = &mut self.outcome {
            *canned = issues;
        }
        self
    }

    fn canned_results() -> JsonMap {
        let mut stats = JsonMap::new();
        stats.insert("total_checks".to_string(), Value::from(25));
        stats.insert("passed".to_string(), Value::from(22));
        stats.insert("failed".to_string(), Value::from(3));

        let mut results = JsonMap::new();
        results.insert(
            "summary".to_string(),
            Value::from("Test completed successfully"),
        );
        results.insert("stats".to_string(), Value::Object(stats));
        results
    }
}

#[async_trait]
impl TestRunner for SimulatedRunner {
    async fn run(&self, request: RunRequest) -> RunOutcome {
        debug!(
            "Simulated {} run starting against {}",
            request.test_type, request.target_url
        );

        sleep(self.config.delay).await;

        match &self.outcome {
            SimulatedOutcome::Success { issues } => RunOutcome::Success {
                results: Self::canned_results(),
                screenshots: Vec::new(),
                videos: Vec::new(),
                issues: issues.clone(),
            },
            SimulatedOutcome::Failure { message, stack } => RunOutcome::Failure {
                error_message: message.clone(),
                error_stack: stack.clone(),
            },
        }
    }

    fn engine_name(&self) -> &'static str {
        "simulated"
    }
}
