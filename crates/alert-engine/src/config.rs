//! Engine configuration

use chainwatch_core::{ChainwatchError, ChainwatchResult};
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

/// Upper bound on the alert cooldown window
const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 60 * 60;

/// Evaluator, scheduler and alert manager settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between scheduled ticks
    pub tick_interval_secs: u64,
    /// Maximum number of metric groups evaluated concurrently
    pub worker_pool_size: usize,
    /// Seconds to wait for one metrics fetch
    pub metrics_timeout_secs: u64,
    /// Seconds an unacknowledged alert suppresses re-firing; `0` disables suppression
    pub alert_cooldown_secs: u64,
    /// Evaluation history older than this many days is pruned; `0` keeps everything
    pub evaluation_retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            worker_pool_size: 8,
            metrics_timeout_secs: 10,
            alert_cooldown_secs: 3600,
            evaluation_retention_days: 30,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_timeout_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn evaluation_retention(&self) -> Option<chrono::Duration> {
        (self.evaluation_retention_days > 0)
            .then(|| chrono::Duration::days(i64::from(self.evaluation_retention_days)))
    }

    pub fn validate(&self) -> ChainwatchResult<()> {
        if self.tick_interval_secs == 0 {
            return Err(ChainwatchError::Configuration(
                "tick_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(ChainwatchError::Configuration(
                "worker_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.metrics_timeout_secs == 0 {
            return Err(ChainwatchError::Configuration(
                "metrics_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.alert_cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(ChainwatchError::Configuration(format!(
                "alert_cooldown_secs must be at most {}",
                MAX_COOLDOWN_SECS
            )));
        }
        Ok(())
    }
}

/// HTTP metrics provider settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsProviderConfig {
    /// Base URL of the portfolio service, e.g. `https://portfolio.internal/api`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: Option<Secret<String>>,
    pub timeout_secs: u64,
}

impl Default for MetricsProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(30));
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.metrics_timeout(), Duration::from_secs(10));
        assert_eq!(config.alert_cooldown(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = EngineConfig::default();
        config.tick_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.worker_pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.alert_cooldown_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retention() {
        let mut config = EngineConfig::default();
        assert_eq!(config.evaluation_retention(), Some(chrono::Duration::days(30)));
        config.evaluation_retention_days = 0;
        assert_eq!(config.evaluation_retention(), None);
    }
}
