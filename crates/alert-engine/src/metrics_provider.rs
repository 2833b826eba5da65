//! Portfolio metrics sources
//!
//! The engine never computes balances or prices itself; it asks a
//! [`MetricsProvider`] for a fresh snapshot on every tick.

use async_trait::async_trait;
use chainwatch_core::{ChainwatchError, ChainwatchResult, PortfolioMetrics, Scope};
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::MetricsProviderConfig;

/// Supplies point-in-time portfolio metrics per user
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Snapshot for `user_id`, restricted to `scope` when given.
    ///
    /// Failures are reported as [`ChainwatchError::MetricsUnavailable`].
    async fn get_metrics(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> ChainwatchResult<PortfolioMetrics>;
}

/// Fetches metrics from `GET {base_url}/users/{user_id}/metrics`
#[derive(Clone)]
pub struct HttpMetricsProvider {
    client: Client,
    base_url: Url,
    api_key: Option<Secret<String>>,
}

impl HttpMetricsProvider {
    pub fn new(config: &MetricsProviderConfig) -> ChainwatchResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ChainwatchError::Configuration(format!(
                "invalid metrics provider url '{}': {}",
                config.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ChainwatchError::Configuration(format!(
                "metrics provider url '{}' cannot be a base",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChainwatchError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Request URL for a user and optional scope
    pub fn metrics_url(&self, user_id: &str, scope: Option<&Scope>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["users", user_id, "metrics"]);
        }

        if let Some(scope) = scope.filter(|s| !s.is_empty()) {
            let mut query = url.query_pairs_mut();
            if !scope.accounts.is_empty() {
                query.append_pair("accounts", &scope.accounts.join(","));
            }
            if !scope.chains.is_empty() {
                query.append_pair("chains", &scope.chains.join(","));
            }
        }
        url
    }
}

#[async_trait]
impl MetricsProvider for HttpMetricsProvider {
    #[instrument(skip(self, scope))]
    async fn get_metrics(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> ChainwatchResult<PortfolioMetrics> {
        let url = self.metrics_url(user_id, scope);
        debug!(%url, "Fetching portfolio metrics");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainwatchError::MetricsUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Metrics provider error ({}): {}", status, body);
            return Err(ChainwatchError::MetricsUnavailable(format!(
                "metrics provider returned {}",
                status
            )));
        }

        response
            .json::<PortfolioMetrics>()
            .await
            .map_err(|e| ChainwatchError::MetricsUnavailable(format!("malformed metrics: {}", e)))
    }
}

/// In-process metrics source for tests and dry runs.
///
/// Snapshots and failures can be changed while the engine is running; every
/// request is recorded.
#[derive(Debug, Default)]
pub struct StaticMetricsProvider {
    snapshots: RwLock<HashMap<String, PortfolioMetrics>>,
    failing: RwLock<HashSet<String>>,
    requests: Mutex<Vec<(String, Option<Scope>)>>,
    delay: Option<Duration>,
}

impl StaticMetricsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(self, user_id: impl Into<String>, metrics: PortfolioMetrics) -> Self {
        self.set_metrics(user_id, metrics);
        self
    }

    /// Every request sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_metrics(&self, user_id: impl Into<String>, metrics: PortfolioMetrics) {
        self.snapshots.write().insert(user_id.into(), metrics);
    }

    /// Makes requests for `user_id` fail until [`recover`](Self::recover) is called
    pub fn fail_for(&self, user_id: impl Into<String>) {
        self.failing.write().insert(user_id.into());
    }

    pub fn recover(&self, user_id: &str) {
        self.failing.write().remove(user_id);
    }

    pub fn requests(&self) -> Vec<(String, Option<Scope>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn get_metrics(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> ChainwatchResult<PortfolioMetrics> {
        self.requests
            .lock()
            .push((user_id.to_string(), scope.cloned()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.read().contains(user_id) {
            return Err(ChainwatchError::MetricsUnavailable(format!(
                "metrics for {} are unavailable",
                user_id
            )));
        }

        self.snapshots.read().get(user_id).cloned().ok_or_else(|| {
            ChainwatchError::MetricsUnavailable(format!("no metrics for {}", user_id))
        })
    }
}
