//! Alert lifecycle: creation under cooldown, acknowledgment, deletion, stats

use chainwatch_core::{
    Alert, AlertId, AlertStats, ChainwatchResult, FireOutcome, FireRequest, PortfolioMetrics,
    Rule,
};
use chainwatch_database::RuleStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Materializes firing rules as alerts and manages their lifecycle
#[derive(Clone)]
pub struct AlertManager {
    store: Arc<dyn RuleStore>,
    cooldown: Option<chrono::Duration>,
}

impl AlertManager {
    /// A zero `cooldown` disables suppression: every firing creates an alert.
    pub fn new(store: Arc<dyn RuleStore>, cooldown: Duration) -> Self {
        let cooldown = if cooldown.is_zero() {
            None
        } else {
            chrono::Duration::from_std(cooldown).ok()
        };
        Self { store, cooldown }
    }

    pub fn cooldown(&self) -> Option<chrono::Duration> {
        self.cooldown
    }

    /// Fires every ALERT action of `rule`, one outcome per action in order
    #[instrument(skip(self, rule, metrics), fields(rule_id = %rule.id, user_id = %rule.user_id))]
    pub async fn fire(
        &self,
        rule: &Rule,
        metrics: &PortfolioMetrics,
    ) -> ChainwatchResult<Vec<FireOutcome>> {
        let now = Utc::now();
        let mut outcomes = Vec::new();

        for (message, severity) in rule.definition.alert_actions() {
            let outcome = self
                .store
                .fire_alert(FireRequest {
                    rule_id: rule.id,
                    user_id: rule.user_id.clone(),
                    message: message.to_string(),
                    severity,
                    metrics: Some(metrics.clone()),
                    cooldown: self.cooldown,
                    now,
                })
                .await?;

            match &outcome {
                FireOutcome::Created(alert) => {
                    metrics::increment_counter!("chainwatch_alerts_created_total", "severity" => severity.as_str());
                    info!(alert_id = %alert.id, %severity, "Alert created");
                }
                FireOutcome::Suppressed { existing } => {
                    metrics::increment_counter!("chainwatch_alerts_suppressed_total");
                    debug!(existing = %existing, "Alert suppressed by cooldown");
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub async fn list(&self, user_id: &str, acknowledged: Option<bool>) -> ChainwatchResult<Vec<Alert>> {
        Ok(self.store.list_alerts(user_id, acknowledged).await?)
    }

    /// Acknowledges one alert; repeating the call is a no-op
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, user_id: &str, alert_id: AlertId) -> ChainwatchResult<Alert> {
        Ok(self.store.acknowledge_alert(user_id, alert_id).await?)
    }

    /// Returns how many alerts changed state
    #[instrument(skip(self))]
    pub async fn acknowledge_all(&self, user_id: &str) -> ChainwatchResult<u64> {
        let count = self.store.acknowledge_all_alerts(user_id).await?;
        info!(count, "Acknowledged all open alerts");
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, alert_id: AlertId) -> ChainwatchResult<()> {
        Ok(self.store.delete_alert(user_id, alert_id).await?)
    }

    pub async fn stats(&self, user_id: &str) -> ChainwatchResult<AlertStats> {
        Ok(self.store.alert_stats(user_id, Utc::now()).await?)
    }
}
