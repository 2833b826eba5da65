//! # In-Memory Store
//!
//! [`RuleStore`] backed by process memory. A single `RwLock` guards all three
//! collections, so every mutating operation (including the cooldown check in
//! [`RuleStore::fire_alert`]) is atomic with respect to the others.

use async_trait::async_trait;
use chainwatch_core::{
    Alert, AlertId, AlertStats, FireOutcome, FireRequest, NewEvaluation, NewRule, Rule,
    RuleDefinition, RuleEvaluation, RuleId, Severity,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult};
use crate::store::RuleStore;

#[derive(Default)]
struct Inner {
    // Kept in insertion order; listings iterate in reverse for newest first.
    rules: Vec<Rule>,
    evaluations: Vec<RuleEvaluation>,
    alerts: Vec<Alert>,
}

impl Inner {
    fn owned_rule_mut(&mut self, user_id: &str, rule_id: RuleId) -> DatabaseResult<&mut Rule> {
        self.rules
            .iter_mut()
            .find(|r| r.id == rule_id && r.user_id == user_id)
            .ok_or_else(|| DatabaseError::rule_not_found(rule_id))
    }

    fn owned_alert_mut(&mut self, user_id: &str, alert_id: AlertId) -> DatabaseResult<&mut Alert> {
        self.alerts
            .iter_mut()
            .find(|a| a.id == alert_id && a.user_id == user_id)
            .ok_or_else(|| DatabaseError::alert_not_found(alert_id))
    }
}

/// Process-local rule store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    #[instrument(skip(self, rule), fields(user_id = %rule.user_id))]
    async fn create_rule(&self, rule: NewRule) -> DatabaseResult<Rule> {
        let now = Utc::now();
        let rule = Rule {
            id: Uuid::new_v4(),
            user_id: rule.user_id,
            name: rule.name,
            description: rule.description,
            original_text: rule.original_text,
            definition: rule.definition,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
        };

        self.inner.write().await.rules.push(rule.clone());
        debug!(rule_id = %rule.id, "Rule created");
        Ok(rule)
    }

    async fn get_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<Rule> {
        self.inner
            .read()
            .await
            .rules
            .iter()
            .find(|r| r.id == rule_id && r.user_id == user_id)
            .cloned()
            .ok_or_else(|| DatabaseError::rule_not_found(rule_id))
    }

    async fn list_rules(&self, user_id: &str) -> DatabaseResult<Vec<Rule>> {
        Ok(self
            .inner
            .read()
            .await
            .rules
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_active_rules(&self) -> DatabaseResult<Vec<Rule>> {
        Ok(self
            .inner
            .read()
            .await
            .rules
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn set_rule_active(
        &self,
        user_id: &str,
        rule_id: RuleId,
        active: bool,
    ) -> DatabaseResult<Rule> {
        let mut inner = self.inner.write().await;
        let rule = inner.owned_rule_mut(user_id, rule_id)?;
        rule.is_active = active;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    #[instrument(skip(self, definition))]
    async fn replace_rule_definition(
        &self,
        user_id: &str,
        rule_id: RuleId,
        definition: RuleDefinition,
    ) -> DatabaseResult<Rule> {
        let mut inner = self.inner.write().await;
        let rule = inner.owned_rule_mut(user_id, rule_id)?;
        rule.definition = definition;
        rule.updated_at = Utc::now();
        Ok(rule.clone())
    }

    #[instrument(skip(self))]
    async fn delete_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<()> {
        let mut inner = self.inner.write().await;
        inner.owned_rule_mut(user_id, rule_id)?;

        inner.rules.retain(|r| r.id != rule_id);
        inner.evaluations.retain(|e| e.rule_id != rule_id);
        inner.alerts.retain(|a| a.rule_id != rule_id);
        Ok(())
    }

    async fn record_evaluation(&self, evaluation: NewEvaluation) -> DatabaseResult<RuleEvaluation> {
        let mut inner = self.inner.write().await;
        if !inner.rules.iter().any(|r| r.id == evaluation.rule_id) {
            return Err(DatabaseError::rule_not_found(evaluation.rule_id));
        }

        let record = RuleEvaluation {
            id: Uuid::new_v4(),
            rule_id: evaluation.rule_id,
            triggered: evaluation.triggered,
            metrics: evaluation.metrics,
            trigger_results: evaluation.trigger_results,
            error: evaluation.error,
            evaluated_at: Utc::now(),
        };
        inner.evaluations.push(record.clone());
        Ok(record)
    }

    async fn list_evaluations(
        &self,
        user_id: &str,
        rule_id: RuleId,
        limit: usize,
    ) -> DatabaseResult<Vec<RuleEvaluation>> {
        let inner = self.inner.read().await;
        if !inner
            .rules
            .iter()
            .any(|r| r.id == rule_id && r.user_id == user_id)
        {
            return Err(DatabaseError::rule_not_found(rule_id));
        }

        Ok(inner
            .evaluations
            .iter()
            .rev()
            .filter(|e| e.rule_id == rule_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn prune_evaluations(&self, older_than: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.evaluations.len();
        inner.evaluations.retain(|e| e.evaluated_at >= older_than);
        Ok((before - inner.evaluations.len()) as u64)
    }

    #[instrument(skip(self, request), fields(rule_id = %request.rule_id))]
    async fn fire_alert(&self, request: FireRequest) -> DatabaseResult<FireOutcome> {
        let mut inner = self.inner.write().await;
        let rule = inner.owned_rule_mut(&request.user_id, request.rule_id)?;
        rule.last_triggered_at = Some(request.now);

        if let Some(cooldown) = request.cooldown {
            let window_start = request.now - cooldown;
            let open = inner.alerts.iter().rev().find(|a| {
                a.rule_id == request.rule_id
                    && !a.acknowledged
                    && a.created_at > window_start
                    && a.created_at < request.now
            });
            if let Some(existing) = open {
                debug!(existing = %existing.id, "Alert suppressed by cooldown");
                return Ok(FireOutcome::Suppressed {
                    existing: existing.id,
                });
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            rule_id: request.rule_id,
            user_id: request.user_id,
            message: request.message,
            severity: request.severity,
            acknowledged: false,
            acknowledged_at: None,
            created_at: request.now,
            metrics: request.metrics,
        };
        inner.alerts.push(alert.clone());
        Ok(FireOutcome::Created(alert))
    }

    async fn list_alerts(
        &self,
        user_id: &str,
        acknowledged: Option<bool>,
    ) -> DatabaseResult<Vec<Alert>> {
        Ok(self
            .inner
            .read()
            .await
            .alerts
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .filter(|a| acknowledged.map_or(true, |ack| a.acknowledged == ack))
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn acknowledge_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<Alert> {
        let mut inner = self.inner.write().await;
        let alert = inner.owned_alert_mut(user_id, alert_id)?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
        }
        Ok(alert.clone())
    }

    #[instrument(skip(self))]
    async fn acknowledge_all_alerts(&self, user_id: &str) -> DatabaseResult<u64> {
        let now = Utc::now();
        let mut count = 0;
        for alert in self
            .inner
            .write()
            .await
            .alerts
            .iter_mut()
            .filter(|a| a.user_id == user_id && !a.acknowledged)
        {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn delete_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<()> {
        let mut inner = self.inner.write().await;
        inner.owned_alert_mut(user_id, alert_id)?;
        inner.alerts.retain(|a| a.id != alert_id);
        Ok(())
    }

    async fn alert_stats(&self, user_id: &str, now: DateTime<Utc>) -> DatabaseResult<AlertStats> {
        let day_ago = now - Duration::hours(24);
        let inner = self.inner.read().await;

        let mut stats = AlertStats::default();
        for alert in inner.alerts.iter().filter(|a| a.user_id == user_id) {
            stats.total += 1;
            if !alert.acknowledged {
                stats.unacknowledged += 1;
            }
            if alert.severity == Severity::High {
                stats.high_severity += 1;
            }
            if alert.created_at >= day_ago {
                stats.last_24h += 1;
            }
        }
        Ok(stats)
    }
}
