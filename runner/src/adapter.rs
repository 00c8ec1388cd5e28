use crate::types::{RunOutcome, RunRequest};
use async_trait::async_trait;

/// The seam at which a real automated-testing engine plugs in.
///
/// Implementations communicate exclusively through the returned [`RunOutcome`];
/// they never touch the test record store. Applying the outcome to persisted
/// state is the orchestrator's job, which keeps the store's write path
/// single-threaded with respect to any one test id.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Execute one test attempt against the request's target.
    ///
    /// This is the only long-running operation in the system and must be
    /// cancellable at its await points: the orchestrator drops the future
    /// when a cancellation wins the race.
    async fn run(&self, request: RunRequest) -> RunOutcome;

    fn engine_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonMap, TestType};

    struct MockRunner;

    #[async_trait]
    impl TestRunner for MockRunner {
        async fn run(&self, _request: RunRequest) -> RunOutcome {
            RunOutcome::Success {
                results: JsonMap::new(),
                screenshots: vec!["shot-1.png".to_string()],
                videos: Vec::new(),
                issues: Vec::new(),
            }
        }

        fn engine_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_runner() {
        let runner = MockRunner;

        let request = RunRequest::new("https://example.com", TestType::Full);
        let outcome = runner.run(request).await;

        assert!(outcome.is_success());
        if let RunOutcome::Success { screenshots, .. } = outcome {
            assert_eq!(screenshots.len(), 1);
        }
        assert_eq!(runner.engine_name(), "mock");
    }
}
