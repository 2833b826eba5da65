//! # Rule Evaluator
//!
//! One tick loads every active rule, groups them by owner and scope, fetches
//! one metrics snapshot per group, evaluates, records and fires. Groups run
//! concurrently on a bounded worker pool; rules inside a group run in order,
//! so no rule is ever evaluated twice at the same time.

use chainwatch_core::{
    evaluate_definition, ChainwatchError, ChainwatchResult, NewEvaluation, PortfolioMetrics,
    Rule, RuleId, Scope,
};
use chainwatch_database::RuleStore;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::alerts::AlertManager;
use crate::config::EngineConfig;
use crate::metrics_provider::MetricsProvider;

/// Counters for one completed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Active rules processed, including failed ones
    pub rules_evaluated: usize,
    pub rules_triggered: usize,
    pub alerts_created: usize,
    pub alerts_suppressed: usize,
    /// Rules whose evaluation could not be completed
    pub failures: usize,
}

impl TickReport {
    fn merge(&mut self, other: TickReport) {
        self.rules_evaluated += other.rules_evaluated;
        self.rules_triggered += other.rules_triggered;
        self.alerts_created += other.alerts_created;
        self.alerts_suppressed += other.alerts_suppressed;
        self.failures += other.failures;
    }
}

/// Result of asking for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was still running
    Skipped,
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Completed(report) => Some(report),
            TickOutcome::Skipped => None,
        }
    }
}

/// Dry-run evaluation of one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RulePreview {
    pub rule_id: RuleId,
    pub triggered: bool,
    pub trigger_results: Vec<bool>,
    pub metrics: PortfolioMetrics,
}

/// Resets the in-flight flag when a tick ends, however it ends.
///
/// Owned by the spawned tick task, so the flag stays set until every group
/// worker has been joined even if the caller stops waiting.
struct TickGuard(Arc<AtomicBool>);

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything a worker needs to evaluate one group
#[derive(Clone)]
struct GroupWorker {
    store: Arc<dyn RuleStore>,
    provider: Arc<dyn MetricsProvider>,
    alerts: AlertManager,
    metrics_timeout: Duration,
}

impl GroupWorker {
    async fn fetch_metrics(
        &self,
        user_id: &str,
        scope: Option<&Scope>,
    ) -> ChainwatchResult<PortfolioMetrics> {
        tokio::time::timeout(self.metrics_timeout, self.provider.get_metrics(user_id, scope))
            .await
            .map_err(|_| {
                ChainwatchError::MetricsUnavailable(format!(
                    "metrics fetch timed out after {:?}",
                    self.metrics_timeout
                ))
            })?
    }

    async fn run(self, user_id: String, scope: Option<Scope>, rules: Vec<Rule>) -> TickReport {
        let mut report = TickReport {
            rules_evaluated: rules.len(),
            ..Default::default()
        };

        let metrics = match self.fetch_metrics(&user_id, scope.as_ref()).await {
            Ok(metrics) => metrics,
            Err(e) => {
                for rule in &rules {
                    warn!(rule_id = %rule.id, user_id = %user_id, error = %e, "Metrics unavailable, recording failed evaluation");
                    if let Err(store_err) = self
                        .store
                        .record_evaluation(NewEvaluation::failed(rule.id, e.to_string()))
                        .await
                    {
                        error!(rule_id = %rule.id, error = %store_err, "Failed to record evaluation");
                    }
                }
                report.failures = rules.len();
                return report;
            }
        };

        for rule in &rules {
            match self.evaluate_rule(rule, &metrics).await {
                Ok(rule_report) => report.merge(rule_report),
                Err(e) => {
                    error!(rule_id = %rule.id, error = %e, "Rule evaluation failed");
                    report.failures += 1;
                }
            }
        }

        report
    }

    async fn evaluate_rule(&self, rule: &Rule, metrics: &PortfolioMetrics) -> ChainwatchResult<TickReport> {
        let outcome = evaluate_definition(&rule.definition, metrics);
        debug!(rule_id = %rule.id, triggered = outcome.triggered, results = ?outcome.trigger_results, "Rule evaluated");

        self.store
            .record_evaluation(NewEvaluation::completed(
                rule.id,
                outcome.triggered,
                metrics.clone(),
                outcome.trigger_results,
            ))
            .await?;

        let mut report = TickReport::default();
        if outcome.triggered {
            report.rules_triggered = 1;
            for fired in self.alerts.fire(rule, metrics).await? {
                if fired.is_created() {
                    report.alerts_created += 1;
                } else {
                    report.alerts_suppressed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Scheduled evaluation of all active rules
pub struct Evaluator {
    worker: GroupWorker,
    worker_pool_size: usize,
    retention: Option<chrono::Duration>,
    in_flight: Arc<AtomicBool>,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn RuleStore>,
        provider: Arc<dyn MetricsProvider>,
        config: &EngineConfig,
    ) -> Self {
        let alerts = AlertManager::new(store.clone(), config.alert_cooldown());
        Self {
            worker: GroupWorker {
                store,
                provider,
                alerts,
                metrics_timeout: config.metrics_timeout(),
            },
            worker_pool_size: config.worker_pool_size.max(1),
            retention: config.evaluation_retention(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.worker.alerts
    }

    /// True while a tick is running
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one tick unless another is already in flight
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> ChainwatchResult<TickOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous tick still running, skipping");
            metrics::increment_counter!("chainwatch_ticks_skipped_total");
            return Ok(TickOutcome::Skipped);
        }
        let guard = TickGuard(self.in_flight.clone());
        let worker = self.worker.clone();
        let pool_size = self.worker_pool_size;

        let tick = tokio::spawn(
            async move {
                let _guard = guard;
                run_groups(worker, pool_size).await
            }
            .in_current_span(),
        );
        let report = tick
            .await
            .map_err(|e| ChainwatchError::Storage(format!("evaluation tick aborted: {e}")))??;

        Ok(TickOutcome::Completed(report))
    }

    /// Evaluates one rule against fresh metrics without recording or firing
    #[instrument(skip(self))]
    pub async fn preview_rule(&self, user_id: &str, rule_id: RuleId) -> ChainwatchResult<RulePreview> {
        let rule = self.worker.store.get_rule(user_id, rule_id).await?;
        let metrics = self
            .worker
            .fetch_metrics(&rule.user_id, rule.definition.scope())
            .await?;
        let outcome = evaluate_definition(&rule.definition, &metrics);

        Ok(RulePreview {
            rule_id,
            triggered: outcome.triggered,
            trigger_results: outcome.trigger_results,
            metrics,
        })
    }

    /// Deletes evaluation history past the retention window
    pub async fn prune_history(&self) -> ChainwatchResult<u64> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let removed = self
            .worker
            .store
            .prune_evaluations(Utc::now() - retention)
            .await?;
        if removed > 0 {
            info!(removed, "Pruned evaluation history");
        }
        Ok(removed)
    }
}

/// One full tick: evaluate every group, then report
async fn run_groups(worker: GroupWorker, pool_size: usize) -> ChainwatchResult<TickReport> {
    let started = Instant::now();
    metrics::increment_counter!("chainwatch_ticks_total");

    let report = evaluate_all(worker, pool_size).await?;

    metrics::histogram!("chainwatch_tick_duration_seconds", started.elapsed().as_secs_f64());
    metrics::counter!("chainwatch_rule_evaluations_total", report.rules_evaluated as u64);
    metrics::counter!("chainwatch_evaluation_failures_total", report.failures as u64);

    info!(
        rules_evaluated = report.rules_evaluated,
        rules_triggered = report.rules_triggered,
        alerts_created = report.alerts_created,
        alerts_suppressed = report.alerts_suppressed,
        failures = report.failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Tick completed"
    );

    Ok(report)
}

async fn evaluate_all(worker: GroupWorker, pool_size: usize) -> ChainwatchResult<TickReport> {
    let rules = worker.store.list_active_rules().await?;
    if rules.is_empty() {
        debug!("No active rules");
        return Ok(TickReport::default());
    }

    let groups = group_rules(rules);
    debug!(groups = groups.len(), "Evaluating rule groups");

    let semaphore = Arc::new(Semaphore::new(pool_size));
    let mut handles = Vec::with_capacity(groups.len());

    for ((user_id, scope), rules) in groups {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ChainwatchError::Configuration(e.to_string()))?;
        let worker = worker.clone();
        let rule_count = rules.len();

        let handle = tokio::spawn(async move {
            let report = worker.run(user_id, scope, rules).await;
            drop(permit);
            report
        });
        handles.push((rule_count, handle));
    }

    let (counts, handles): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
    let mut report = TickReport::default();
    for (rule_count, joined) in counts.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(group_report) => report.merge(group_report),
            Err(e) => {
                error!(error = %e, "Evaluation worker panicked");
                report.merge(TickReport {
                    rules_evaluated: rule_count,
                    failures: rule_count,
                    ..Default::default()
                });
            }
        }
    }

    Ok(report)
}

/// Groups rules by owner and scope; unscoped rules of a user share one group
fn group_rules(rules: Vec<Rule>) -> HashMap<(String, Option<Scope>), Vec<Rule>> {
    let mut groups: HashMap<(String, Option<Scope>), Vec<Rule>> = HashMap::new();
    for rule in rules {
        let key = (rule.user_id.clone(), rule.definition.scope().cloned());
        groups.entry(key).or_default().push(rule);
    }
    groups
}
