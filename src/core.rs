//! Chainwatch engine facade

use alert_engine::{
    EngineConfig, Evaluator, HttpMetricsProvider, MetricsProvider, RulePreview, RuleService,
    Scheduler, SchedulerHandle, TickOutcome,
};
use async_trait::async_trait;
use chainwatch_core::{
    Alert, AlertId, AlertStats, ChainwatchError, ChainwatchResult, Rule, RuleDefinition,
    RuleEvaluation, RuleId,
};
use chainwatch_database::{DatabaseManager, MemoryStore, PgStore, RuleStore, StorageBackend};
use rule_compiler::{OpenRouterOracle, OracleError, RuleCompiler, TextOracle, DEFAULT_ORACLE_TIMEOUT};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ChainwatchConfig;

/// Entry point to rule compilation, evaluation and alert management.
///
/// Every user-facing operation takes the calling `user_id`; rules and alerts
/// owned by someone else are reported as not found.
#[derive(Clone)]
pub struct Chainwatch {
    rules: RuleService,
    evaluator: Arc<Evaluator>,
    engine: EngineConfig,
}

impl fmt::Debug for Chainwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chainwatch")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Chainwatch`]
pub struct ChainwatchBuilder {
    store: Option<Arc<dyn RuleStore>>,
    metrics_provider: Option<Arc<dyn MetricsProvider>>,
    oracle: Option<Arc<dyn TextOracle>>,
    oracle_timeout: Duration,
    engine: EngineConfig,
}

impl fmt::Debug for ChainwatchBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainwatchBuilder")
            .field("has_store", &self.store.is_some())
            .field("has_metrics_provider", &self.metrics_provider.is_some())
            .field("has_oracle", &self.oracle.is_some())
            .field("oracle_timeout", &self.oracle_timeout)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Chainwatch {
    /// Create a new builder
    pub fn builder() -> ChainwatchBuilder {
        ChainwatchBuilder {
            store: None,
            metrics_provider: None,
            oracle: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            engine: EngineConfig::default(),
        }
    }

    /// Wires the engine from application configuration: opens the configured
    /// store, connects the HTTP metrics provider and, when an API key is
    /// present, the OpenRouter oracle.
    pub async fn from_config(config: &ChainwatchConfig) -> ChainwatchResult<Self> {
        let store: Arc<dyn RuleStore> = match config.database.backend {
            StorageBackend::Memory => {
                info!("Using in-memory rule store");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::Postgres => {
                let manager = DatabaseManager::new(config.database.clone()).await?;
                info!("Using PostgreSQL rule store ({})", manager.pool_stats());
                Arc::new(PgStore::open(&manager).await?)
            }
        };

        let provider = HttpMetricsProvider::new(&config.metrics_provider)?;

        let mut builder = Chainwatch::builder()
            .store(store)
            .metrics_provider(Arc::new(provider))
            .engine_config(config.engine.clone())
            .oracle_timeout(config.compiler.oracle_timeout());

        if let Some(openrouter) = config.compiler.openrouter() {
            let oracle = OpenRouterOracle::new(openrouter)
                .map_err(|e| ChainwatchError::Configuration(e.to_string()))?;
            builder = builder.oracle(Arc::new(oracle));
        }

        builder.build()
    }

    /// Compiles `text` into a rule and persists it as active
    pub async fn compile_rule(
        &self,
        user_id: &str,
        text: &str,
        name: Option<&str>,
    ) -> ChainwatchResult<Rule> {
        self.rules.compile_rule(user_id, text, name).await
    }

    /// Validates a JSON rule definition and persists it as active
    pub async fn create_rule(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        definition: &Value,
    ) -> ChainwatchResult<Rule> {
        self.rules
            .create_rule(user_id, name, description, definition)
            .await
    }

    /// Persists an already-validated definition as an active rule
    pub async fn create_rule_from_definition(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        definition: RuleDefinition,
    ) -> ChainwatchResult<Rule> {
        self.rules
            .create_rule_from_definition(user_id, name, description, definition)
            .await
    }

    /// Fetch one rule
    pub async fn get_rule(&self, user_id: &str, rule_id: RuleId) -> ChainwatchResult<Rule> {
        self.rules.get_rule(user_id, rule_id).await
    }

    /// All rules of a user, newest first
    pub async fn list_rules(&self, user_id: &str) -> ChainwatchResult<Vec<Rule>> {
        self.rules.list_rules(user_id).await
    }

    /// Activate or deactivate a rule
    pub async fn set_rule_active(
        &self,
        user_id: &str,
        rule_id: RuleId,
        active: bool,
    ) -> ChainwatchResult<Rule> {
        self.rules.set_rule_active(user_id, rule_id, active).await
    }

    /// Replace a rule's definition wholesale
    pub async fn replace_rule_definition(
        &self,
        user_id: &str,
        rule_id: RuleId,
        definition: &Value,
    ) -> ChainwatchResult<Rule> {
        self.rules
            .replace_rule_definition(user_id, rule_id, definition)
            .await
    }

    /// Delete a rule together with its evaluations and alerts
    pub async fn delete_rule(&self, user_id: &str, rule_id: RuleId) -> ChainwatchResult<()> {
        self.rules.delete_rule(user_id, rule_id).await
    }

    /// Evaluate a rule against fresh metrics without recording or alerting
    pub async fn preview_rule(
        &self,
        user_id: &str,
        rule_id: RuleId,
    ) -> ChainwatchResult<RulePreview> {
        self.evaluator.preview_rule(user_id, rule_id).await
    }

    /// Evaluation history of a rule, newest first
    pub async fn list_evaluations(
        &self,
        user_id: &str,
        rule_id: RuleId,
        limit: usize,
    ) -> ChainwatchResult<Vec<RuleEvaluation>> {
        self.rules.list_evaluations(user_id, rule_id, limit).await
    }

    /// Alerts of a user, optionally filtered by acknowledgment state
    pub async fn list_alerts(
        &self,
        user_id: &str,
        acknowledged: Option<bool>,
    ) -> ChainwatchResult<Vec<Alert>> {
        self.evaluator.alerts().list(user_id, acknowledged).await
    }

    /// Acknowledge one alert; acknowledging twice is a no-op
    pub async fn acknowledge_alert(
        &self,
        user_id: &str,
        alert_id: AlertId,
    ) -> ChainwatchResult<Alert> {
        self.evaluator.alerts().acknowledge(user_id, alert_id).await
    }

    /// Acknowledge every open alert, returning how many changed
    pub async fn acknowledge_all_alerts(&self, user_id: &str) -> ChainwatchResult<u64> {
        self.evaluator.alerts().acknowledge_all(user_id).await
    }

    /// Delete one alert
    pub async fn delete_alert(&self, user_id: &str, alert_id: AlertId) -> ChainwatchResult<()> {
        self.evaluator.alerts().delete(user_id, alert_id).await
    }

    /// Alert counts for a user
    pub async fn alert_stats(&self, user_id: &str) -> ChainwatchResult<AlertStats> {
        self.evaluator.alerts().stats(user_id).await
    }

    /// Run one evaluation tick now; skipped if a tick is already running
    pub async fn run_tick(&self) -> ChainwatchResult<TickOutcome> {
        self.evaluator.run_tick().await
    }

    /// Start evaluating on the configured interval
    pub fn start_scheduler(&self) -> SchedulerHandle {
        Scheduler::new(self.evaluator.clone(), self.engine.tick_interval()).start()
    }

    /// Drop evaluation history past the configured retention
    pub async fn prune_history(&self) -> ChainwatchResult<u64> {
        self.evaluator.prune_history().await
    }

    /// Engine settings in effect
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }
}

impl ChainwatchBuilder {
    /// Set the rule store; defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn RuleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the portfolio metrics source (required)
    pub fn metrics_provider(mut self, provider: Arc<dyn MetricsProvider>) -> Self {
        self.metrics_provider = Some(provider);
        self
    }

    /// Set the text oracle used for rule compilation
    pub fn oracle(mut self, oracle: Arc<dyn TextOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set how long compilation waits for the oracle
    pub fn oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Set evaluator, scheduler and alert settings
    pub fn engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Build the engine
    pub fn build(self) -> ChainwatchResult<Chainwatch> {
        self.engine.validate()?;

        let metrics_provider = self.metrics_provider.ok_or_else(|| {
            ChainwatchError::Configuration("a metrics provider is required".to_string())
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let oracle = self.oracle.unwrap_or_else(|| {
            warn!("No text oracle configured; compile_rule will report the oracle as unavailable");
            Arc::new(NoOracle)
        });

        let compiler = RuleCompiler::new(oracle).with_timeout(self.oracle_timeout);
        let evaluator = Arc::new(Evaluator::new(store.clone(), metrics_provider, &self.engine));

        Ok(Chainwatch {
            rules: RuleService::new(store, compiler),
            evaluator,
            engine: self.engine,
        })
    }
}

/// Stands in when no oracle is configured
struct NoOracle;

#[async_trait]
impl TextOracle for NoOracle {
    async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::Configuration(
            "no text oracle is configured".to_string(),
        ))
    }
}
