use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedRunnerConfig {
    /// Fixed wait standing in for real browser-automation latency
    pub delay: Duration,
}

impl Default for SimulatedRunnerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

impl SimulatedRunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.delay.is_zero() {
            return Err("Delay must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulatedRunnerConfig::default();
        assert_eq!(config.delay, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SimulatedRunnerConfig::new().with_delay(Duration::from_millis(50));
        assert_eq!(config.delay, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = SimulatedRunnerConfig::new().with_delay(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
