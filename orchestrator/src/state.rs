//! Test lifecycle state machine.
//!
//! Legal transitions:
//!
//! ```text
//! pending --(execution starts)-----> running
//! running --(execution succeeds)---> completed
//! running --(execution errors)-----> failed
//! pending|running --(cancellation)-> cancelled
//! ```
//!
//! [`apply`] is a total function over (status, transition): anything outside
//! the table fails with [`TransitionError::Illegal`] and produces no write.
//! The function is pure; the store is the only component that commits its
//! output, which keeps status, timestamps, and payload atomic.

use crate::record::{TestRecord, TestStatus};
use chrono::{DateTime, Utc};
use runner::JsonMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TransitionError {
    /// The attempted transition is not in the lifecycle table
    #[error("illegal transition for test {test_id}: {from} -> {attempted}")]
    Illegal {
        test_id: Uuid,
        from: TestStatus,
        attempted: &'static str,
    },
}

/// An edge in the lifecycle table, carrying the payload its entry action needs
#[derive(Debug, Clone)]
pub enum Transition {
    /// A worker picked the job up
    Start,
    /// The runner reported a successful outcome
    Complete {
        results: JsonMap,
        screenshots: Vec<String>,
        videos: Vec<String>,
    },
    /// The runner reported an execution failure
    Fail {
        error_message: String,
        error_stack: Option<String>,
    },
    /// External cancellation, before or during execution
    Cancel,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Complete { .. } => "complete",
            Transition::Fail { .. } => "fail",
            Transition::Cancel => "cancel",
        }
    }
}

/// Apply `transition` to a copy of `record` at time `now`.
///
/// Entry actions: start stamps `started_at`; every terminal transition out of
/// running stamps `completed_at` and the exact `duration_seconds`; completion
/// requires results; failure requires an error message. Cancellation from
/// pending leaves all timing fields empty because the job never ran.
pub fn apply(
    record: &TestRecord,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<TestRecord, TransitionError> {
    let mut updated = record.clone();

    match (record.status, transition) {
        (TestStatus::Pending, Transition::Start) => {
            updated.status = TestStatus::Running;
            updated.started_at = Some(now);
        }
        (
            TestStatus::Running,
            Transition::Complete {
                results,
                screenshots,
                videos,
            },
        ) => {
            updated.status = TestStatus::Completed;
            updated.results = Some(results);
            updated.screenshots = screenshots;
            updated.videos = videos;
            finalize_timing(&mut updated, now);
        }
        (
            TestStatus::Running,
            Transition::Fail {
                error_message,
                error_stack,
            },
        ) => {
            updated.status = TestStatus::Failed;
            updated.error_message = Some(error_message);
            updated.error_stack = error_stack;
            finalize_timing(&mut updated, now);
        }
        (TestStatus::Pending, Transition::Cancel) => {
            updated.status = TestStatus::Cancelled;
        }
        (TestStatus::Running, Transition::Cancel) => {
            updated.status = TestStatus::Cancelled;
            finalize_timing(&mut updated, now);
        }
        (from, attempted) => {
            return Err(TransitionError::Illegal {
                test_id: record.id,
                from,
                attempted: attempted.name(),
            });
        }
    }

    updated.version = record.version + 1;
    Ok(updated)
}

fn finalize_timing(record: &mut TestRecord, now: DateTime<Utc>) {
    let started = record.started_at.unwrap_or(now);
    record.completed_at = Some(now);
    record.duration_seconds = Some((now - started).num_seconds());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use runner::TestType;

    fn pending() -> TestRecord {
        TestRecord::new(Uuid::new_v4(), TestType::Full)
    }

    fn running() -> TestRecord {
        apply(&pending(), Transition::Start, Utc::now()).unwrap()
    }

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

    fn fail() -> Transition {
        Transition::Fail {
            error_message: "engine exploded".to_string(),
            error_stack: Some("trace".to_string()),
        }
    }

    #[test]
    fn start_stamps_started_at() {
        let record = pending();
        let now = Utc::now();
        let updated = apply(&record, Transition::Start, now).unwrap();

        assert_eq!(updated.status, TestStatus::Running);
        assert_eq!(updated.started_at, Some(now));
        assert!(updated.completed_at.is_none());
        assert_eq!(updated.version, record.version + 1);
    }

    #[test]
    fn completion_sets_results_and_exact_duration() {
        let record = running();
        let started = record.started_at.unwrap();
        let now = started + Duration::seconds(7);

        let updated = apply(&record, complete(), now).unwrap();

        assert_eq!(updated.status, TestStatus::Completed);
        assert!(updated.results.is_some());
        assert!(updated.error_message.is_none());
        assert_eq!(updated.completed_at, Some(now));
        assert_eq!(updated.duration_seconds, Some(7));
    }

    #[test]
    fn failure_sets_error_and_timing() {
        let record = running();
        let updated = apply(&record, fail(), Utc::now()).unwrap();

        assert_eq!(updated.status, TestStatus::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("engine exploded"));
        assert_eq!(updated.error_stack.as_deref(), Some("trace"));
        assert!(updated.results.is_none());
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn cancel_from_pending_leaves_timing_empty() {
        let updated = apply(&pending(), Transition::Cancel, Utc::now()).unwrap();

        assert_eq!(updated.status, TestStatus::Cancelled);
        assert!(updated.started_at.is_none());
        assert!(updated.completed_at.is_none());
        assert!(updated.duration_seconds.is_none());
    }

    #[test]
    fn cancel_from_running_finalizes_timing() {
        let updated = apply(&running(), Transition::Cancel, Utc::now()).unwrap();

        assert_eq!(updated.status, TestStatus::Cancelled);
        assert!(updated.started_at.is_some());
        assert!(updated.completed_at.is_some());
        assert!(updated.results.is_none());
        assert!(updated.error_message.is_none());
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        let now = Utc::now();
        let terminals = [
            apply(&running(), complete(), now).unwrap(),
            apply(&running(), fail(), now).unwrap(),
            apply(&pending(), Transition::Cancel, now).unwrap(),
        ];

        for record in &terminals {
            assert!(apply(record, Transition::Start, now).is_err());
            assert!(apply(record, complete(), now).is_err());
            assert!(apply(record, fail(), now).is_err());
            assert!(apply(record, Transition::Cancel, now).is_err());
        }
    }

    #[test]
    fn pending_rejects_terminal_outcomes() {
        let record = pending();
        let now = Utc::now();

        assert!(apply(&record, complete(), now).is_err());
        assert!(apply(&record, fail(), now).is_err());
    }

    #[test]
    fn running_rejects_restart() {
        assert!(apply(&running(), Transition::Start, Utc::now()).is_err());
    }

    #[test]
    fn illegal_transition_reports_context() {
        let record = pending();
        let err = apply(&record, complete(), Utc::now()).unwrap_err();
        let TransitionError::Illegal {
            test_id,
            from,
            attempted,
        } = err;

        assert_eq!(test_id, record.id);
        assert_eq!(from, TestStatus::Pending);
        assert_eq!(attempted, "complete");
    }
}
