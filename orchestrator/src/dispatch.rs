//! Execution dispatcher and worker pool.
//!
//! Submission creates a pending test record, commits it durably, and hands a
//! job to a fixed pool of worker tasks over a bounded queue; the call returns
//! before execution begins. Each worker owns one test's execution lifecycle
//! end-to-end: it marks the test running, drives the runner, and applies the
//! terminal transition from the outcome. Lifecycle events are published on a
//! broadcast channel so callers can subscribe for completion instead of
//! polling.
//!
//! Cancellation targets one test id. A pending test is cancelled in the
//! store before its job starts; the worker that later dequeues the job sees
//! the terminal state and drops it. A running test's worker is signalled
//! through a watch channel and acknowledges by applying the cancelled
//! transition itself; if no acknowledgement arrives within the configured
//! timeout the canceller forces the transition and any in-flight outcome is
//! discarded as a duplicate callback.
//!
//! On startup the dispatcher requeues every pending test found in the store,
//! so submitted work survives a process restart.

use crate::config::OrchestratorConfig;
use crate::record::{IssueRecord, ProjectRecord, TestRecord, TestStatus};
use crate::state::Transition;
use crate::store::{StoreError, TestStore};
use runner::{JsonMap, RunOutcome, RunRequest, TestRunner, TestType};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool is gone; nothing can be scheduled
    #[error("execution queue is closed")]
    QueueClosed,
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Lifecycle notification published whenever a test changes status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestEvent {
    pub test_id: Uuid,
    pub status: TestStatus,
}

struct Job {
    test_id: Uuid,
    request: RunRequest,
    cancel: watch::Receiver<bool>,
}

type CancelMap = Arc<Mutex<HashMap<Uuid, watch::Sender<bool>>>>;

/// Accepts test-run requests and schedules them for asynchronous execution
pub struct Dispatcher {
    store: Arc<dyn TestStore>,
    queue: mpsc::Sender<Job>,
    events: broadcast::Sender<TestEvent>,
    cancels: CancelMap,
    config: OrchestratorConfig,
}

impl Dispatcher {
    /// Spawn the worker pool and requeue any pending tests left over from a
    /// previous process.
    pub async fn start(
        store: Arc<dyn TestStore>,
        runner: Arc<dyn TestRunner>,
        config: OrchestratorConfig,
    ) -> DispatchResult<Self> {
        let (queue, queue_rx) = mpsc::channel::<Job>(config.queue_capacity);
        let (events, _) = broadcast::channel(config.event_buffer);
        let cancels: CancelMap = Arc::new(Mutex::new(HashMap::new()));

        let ctx = WorkerContext {
            store: Arc::clone(&store),
            runner,
            events: events.clone(),
            cancels: Arc::clone(&cancels),
        };

        let shared_rx = Arc::new(Mutex::new(queue_rx));
        for index in 0..config.worker_count {
            let ctx = ctx.clone();
            let rx = Arc::clone(&shared_rx);
            tokio::spawn(async move {
                debug!("Execution worker {} started", index);
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => ctx.run_job(job).await,
                        None => {
                            debug!("Execution queue closed; worker {} exiting", index);
                            break;
                        }
                    }
                }
            });
        }

        let dispatcher = Self {
            store,
            queue,
            events,
            cancels,
            config,
        };
        dispatcher.requeue_pending().await?;
        Ok(dispatcher)
    }

    /// Create a pending test for `project` and schedule exactly one
    /// asynchronous execution. Returns once the record is committed; callers
    /// poll or subscribe for completion.
    pub async fn submit(
        &self,
        project: &ProjectRecord,
        test_type: TestType,
        config: Option<JsonMap>,
    ) -> DispatchResult<TestRecord> {
        let test = TestRecord::new(project.id, test_type);
        // if this write fails the job must not be scheduled at all
        self.store.insert_test(test.clone()).await?;

        let effective_config = config.or_else(|| project.test_config.clone());
        self.enqueue(&test, project, effective_config).await?;
        self.emit(test.id, TestStatus::Pending);
        info!(
            "Test {} ({}) submitted for project {}",
            test.id, test_type, project.id
        );
        Ok(test)
    }

    /// Cancel one test. Pending tests are cancelled before their job starts;
    /// running tests are signalled and given `cancel_ack_timeout` to
    /// acknowledge before the transition is forced. Cancelling a test that is
    /// already terminal is a no-op reporting the current record.
    pub async fn cancel(&self, test_id: Uuid) -> DispatchResult<TestRecord> {
        let record = self.store.get_test(test_id).await?;
        match record.status {
            TestStatus::Pending => match self
                .store
                .apply_transition(test_id, Transition::Cancel)
                .await
            {
                Ok(updated) => {
                    // wake the worker in case the job was already dequeued;
                    // its start transition will fail and the job is dropped
                    self.signal_cancel(test_id).await;
                    self.emit(test_id, updated.status);
                    info!("Test {} cancelled before execution", test_id);
                    Ok(updated)
                }
                Err(StoreError::Transition(_)) => {
                    let current = self.store.get_test(test_id).await?;
                    if current.status == TestStatus::Running {
                        self.cancel_running(test_id).await
                    } else {
                        debug!("Cancellation of test {} is a no-op: already terminal", test_id);
                        Ok(current)
                    }
                }
                Err(err) => Err(err.into()),
            },
            TestStatus::Running => self.cancel_running(test_id).await,
            _ => {
                debug!("Cancellation of test {} is a no-op: already terminal", test_id);
                Ok(record)
            }
        }
    }

    /// Subscribe to lifecycle events for all tests
    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.events.subscribe()
    }

    async fn cancel_running(&self, test_id: Uuid) -> DispatchResult<TestRecord> {
        let mut events = self.events.subscribe();
        self.signal_cancel(test_id).await;

        let acknowledged = tokio::time::timeout(self.config.cancel_ack_timeout, async {
            loop {
                match events.recv().await {
                    Ok(ev) if ev.test_id == test_id && ev.status.is_terminal() => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await;

        match acknowledged {
            Ok(()) => Ok(self.store.get_test(test_id).await?),
            Err(_) => {
                warn!(
                    "Runner did not confirm cancellation of test {} within {:?}; forcing cancelled state",
                    test_id, self.config.cancel_ack_timeout
                );
                match self
                    .store
                    .apply_transition(test_id, Transition::Cancel)
                    .await
                {
                    Ok(updated) => {
                        self.emit(test_id, updated.status);
                        Ok(updated)
                    }
                    Err(StoreError::Transition(_)) => {
                        // the worker's terminal write won the race
                        Ok(self.store.get_test(test_id).await?)
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    async fn requeue_pending(&self) -> DispatchResult<()> {
        let pending = self.store.pending_tests().await?;
        for test in pending {
            let project = match self.store.get_project(test.project_id).await {
                Ok(project) => project,
                Err(err) => {
                    warn!(
                        "Skipping requeue of test {}: project lookup failed: {}",
                        test.id, err
                    );
                    continue;
                }
            };
            self.enqueue(&test, &project, project.test_config.clone())
                .await?;
            info!("Requeued pending test {}", test.id);
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        test: &TestRecord,
        project: &ProjectRecord,
        config: Option<JsonMap>,
    ) -> DispatchResult<()> {
        let cancel = {
            let mut cancels = self.cancels.lock().await;
            let (tx, rx) = watch::channel(false);
            cancels.insert(test.id, tx);
            rx
        };

        let mut request = RunRequest::new(project.target_url.clone(), test.test_type);
        if let Some(config) = config {
            request = request.with_config(config);
        }

        let job = Job {
            test_id: test.id,
            request,
            cancel,
        };
        self.queue
            .send(job)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    async fn signal_cancel(&self, test_id: Uuid) {
        let cancels = self.cancels.lock().await;
        if let Some(tx) = cancels.get(&test_id) {
            if tx.send(true).is_err() {
                debug!("Cancel signal for test {} had no listener", test_id);
            }
        }
    }

    fn emit(&self, test_id: Uuid, status: TestStatus) {
        let _ = self.events.send(TestEvent { test_id, status });
    }
}

#[derive(Clone)]
struct WorkerContext {
    store: Arc<dyn TestStore>,
    runner: Arc<dyn TestRunner>,
    events: broadcast::Sender<TestEvent>,
    cancels: CancelMap,
}

impl WorkerContext {
    async fn run_job(&self, job: Job) {
        let Job {
            test_id,
            request,
            cancel,
        } = job;

        let started = match self.store.apply_transition(test_id, Transition::Start).await {
            Ok(record) => record,
            Err(StoreError::Transition(_)) => {
                info!("Dropping job for test {}: no longer pending", test_id);
                self.remove_cancel(test_id).await;
                return;
            }
            Err(err) => {
                error!("Failed to mark test {} running: {}", test_id, err);
                self.remove_cancel(test_id).await;
                return;
            }
        };
        self.emit(test_id, started.status);
        debug!(
            "Worker executing test {} on engine {}",
            test_id,
            self.runner.engine_name()
        );

        tokio::select! {
            outcome = self.runner.run(request) => self.apply_outcome(test_id, outcome).await,
            _ = wait_for_cancel(cancel) => self.apply_cancel(test_id).await,
        }

        self.remove_cancel(test_id).await;
    }

    /// Apply the runner's reported outcome. A second callback for a test
    /// already in a terminal state is absorbed as a no-op.
    async fn apply_outcome(&self, test_id: Uuid, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Success {
                results,
                screenshots,
                videos,
                issues,
            } => {
                let transition = Transition::Complete {
                    results,
                    screenshots,
                    videos,
                };
                match self.store.apply_transition(test_id, transition).await {
                    Ok(updated) => {
                        for found in issues {
                            let issue = IssueRecord::from_discovered(test_id, found);
                            if let Err(err) = self.store.insert_issue(issue).await {
                                error!(
                                    "Failed to record discovered issue for test {}: {}",
                                    test_id, err
                                );
                            }
                        }
                        info!("Test {} completed", test_id);
                        self.emit(test_id, updated.status);
                    }
                    Err(StoreError::Transition(_)) => {
                        warn!(
                            "Discarding completion callback for test {}: already terminal",
                            test_id
                        );
                    }
                    Err(err) => error!("Failed to record completion of test {}: {}", test_id, err),
                }
            }
            RunOutcome::Failure {
                error_message,
                error_stack,
            } => {
                let transition = Transition::Fail {
                    error_message: error_message.clone(),
                    error_stack,
                };
                match self.store.apply_transition(test_id, transition).await {
                    Ok(updated) => {
                        info!("Test {} failed: {}", test_id, error_message);
                        self.emit(test_id, updated.status);
                    }
                    Err(StoreError::Transition(_)) => {
                        warn!(
                            "Discarding failure callback for test {}: already terminal",
                            test_id
                        );
                    }
                    Err(err) => error!("Failed to record failure of test {}: {}", test_id, err),
                }
            }
        }
    }

    async fn apply_cancel(&self, test_id: Uuid) {
        match self.store.apply_transition(test_id, Transition::Cancel).await {
            Ok(updated) => {
                info!("Test {} cancelled during execution", test_id);
                self.emit(test_id, updated.status);
            }
            Err(StoreError::Transition(_)) => {
                debug!("Cancellation of test {} is a no-op: already terminal", test_id);
            }
            Err(err) => error!("Failed to record cancellation of test {}: {}", test_id, err),
        }
    }

    async fn remove_cancel(&self, test_id: Uuid) {
        self.cancels.lock().await.remove(&test_id);
    }

    fn emit(&self, test_id: Uuid, status: TestStatus) {
        let _ = self.events.send(TestEvent { test_id, status });
    }
}

/// Resolves when the watch flag flips to true. If the sender is dropped
/// without signalling, parks forever so the runner branch of the select wins.
async fn wait_for_cancel(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
