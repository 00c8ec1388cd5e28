use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator settings, constructed explicitly and passed to each component
/// at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of worker tasks executing tests concurrently
    pub worker_count: usize,
    /// Bound of the submission queue between dispatcher and workers
    pub queue_capacity: usize,
    /// How long a cancellation waits for the worker to acknowledge before
    /// the cancelled transition is forced
    pub cancel_ack_timeout: Duration,
    /// Capacity of the lifecycle event broadcast channel
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 64,
            cancel_ack_timeout: Duration::from_secs(5),
            event_buffer: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_cancel_ack_timeout(mut self, cancel_ack_timeout: Duration) -> Self {
        self.cancel_ack_timeout = cancel_ack_timeout;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("Worker count must be greater than 0".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("Queue capacity must be greater than 0".to_string());
        }

        if self.cancel_ack_timeout.is_zero() {
            return Err("Cancel acknowledgement timeout must be greater than 0".to_string());
        }

        if self.event_buffer == 0 {
            return Err("Event buffer must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Parse a TOML fragment; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, String> {
        let file: ConfigFile = toml::from_str(raw).map_err(|e| e.to_string())?;

        let mut config = Self::default();
        if let Some(worker_count) = file.worker_count {
            config.worker_count = worker_count;
        }
        if let Some(queue_capacity) = file.queue_capacity {
            config.queue_capacity = queue_capacity;
        }
        if let Some(secs) = file.cancel_ack_timeout_secs {
            config.cancel_ack_timeout = Duration::from_secs(secs);
        }
        if let Some(event_buffer) = file.event_buffer {
            config.event_buffer = event_buffer;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    worker_count: Option<usize>,
    queue_capacity: Option<usize>,
    cancel_ack_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
}
