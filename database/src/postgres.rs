//! # PostgreSQL Store
//!
//! [`RuleStore`] backed by PostgreSQL through SQLx. Rule definitions and
//! metric snapshots are stored as JSONB; alert creation runs in a single
//! transaction holding a row lock on the firing rule.

use async_trait::async_trait;
use chainwatch_core::{
    Alert, AlertId, AlertStats, FireOutcome, FireRequest, NewEvaluation, NewRule, Rule,
    RuleDefinition, RuleEvaluation, RuleId,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::database::DatabaseManager;
use crate::error::{DatabaseError, DatabaseResult};
use crate::store::RuleStore;
use crate::types::{AlertRecord, AlertStatsRecord, EvaluationRecord, RuleRecord};

const RULE_COLUMNS: &str = "id, user_id, name, description, original_text, definition, \
     is_active, created_at, updated_at, last_triggered_at";

const EVALUATION_COLUMNS: &str =
    "id, rule_id, triggered, metrics, trigger_results, error, evaluated_at";

const ALERT_COLUMNS: &str = "id, rule_id, user_id, message, severity, acknowledged, \
     acknowledged_at, created_at, metrics";

/// PostgreSQL-backed rule store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a store on the manager's pool, applying migrations when configured
    #[instrument(skip(manager))]
    pub async fn open(manager: &DatabaseManager) -> DatabaseResult<Self> {
        if manager.config().run_migrations {
            let result = manager.migrate().await?;
            info!(applied = ?result.applied, "Database schema is up to date");
        }
        Ok(Self::new(manager.pool().clone()))
    }

    async fn ensure_rule_owned(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM rules WHERE id = $1 AND user_id = $2)",
        )
        .bind(rule_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(DatabaseError::rule_not_found(rule_id))
        }
    }
}

#[async_trait]
impl RuleStore for PgStore {
    #[instrument(skip(self, rule), fields(user_id = %rule.user_id))]
    async fn create_rule(&self, rule: NewRule) -> DatabaseResult<Rule> {
        let record: RuleRecord = sqlx::query_as(&format!(
            "INSERT INTO rules (id, user_id, name, description, original_text, definition) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RULE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&rule.user_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.original_text)
        .bind(Json(&rule.definition))
        .fetch_one(&self.pool)
        .await?;

        debug!(rule_id = %record.id, "Rule created");
        Ok(record.into())
    }

    async fn get_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<Rule> {
        sqlx::query_as::<_, RuleRecord>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1 AND user_id = $2"
        ))
        .bind(rule_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Rule::from)
        .ok_or_else(|| DatabaseError::rule_not_found(rule_id))
    }

    async fn list_rules(&self, user_id: &str) -> DatabaseResult<Vec<Rule>> {
        let records: Vec<RuleRecord> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Rule::from).collect())
    }

    async fn list_active_rules(&self) -> DatabaseResult<Vec<Rule>> {
        let records: Vec<RuleRecord> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE is_active ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Rule::from).collect())
    }

    #[instrument(skip(self))]
    async fn set_rule_active(
        &self,
        user_id: &str,
        rule_id: RuleId,
        active: bool,
    ) -> DatabaseResult<Rule> {
        sqlx::query_as::<_, RuleRecord>(&format!(
            "UPDATE rules SET is_active = $3, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule_id)
        .bind(user_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .map(Rule::from)
        .ok_or_else(|| DatabaseError::rule_not_found(rule_id))
    }

    #[instrument(skip(self, definition))]
    async fn replace_rule_definition(
        &self,
        user_id: &str,
        rule_id: RuleId,
        definition: RuleDefinition,
    ) -> DatabaseResult<Rule> {
        sqlx::query_as::<_, RuleRecord>(&format!(
            "UPDATE rules SET definition = $3, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule_id)
        .bind(user_id)
        .bind(Json(&definition))
        .fetch_optional(&self.pool)
        .await?
        .map(Rule::from)
        .ok_or_else(|| DatabaseError::rule_not_found(rule_id))
    }

    #[instrument(skip(self))]
    async fn delete_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<()> {
        // Evaluations and alerts go with the rule through ON DELETE CASCADE.
        let rows = sqlx::query("DELETE FROM rules WHERE id = $1 AND user_id = $2")
            .bind(rule_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(DatabaseError::rule_not_found(rule_id));
        }
        Ok(())
    }

    async fn record_evaluation(&self, evaluation: NewEvaluation) -> DatabaseResult<RuleEvaluation> {
        let record: EvaluationRecord = sqlx::query_as(&format!(
            "INSERT INTO rule_evaluations (id, rule_id, triggered, metrics, trigger_results, error) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {EVALUATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(evaluation.rule_id)
        .bind(evaluation.triggered)
        .bind(evaluation.metrics.as_ref().map(Json))
        .bind(&evaluation.trigger_results)
        .bind(&evaluation.error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DatabaseError::rule_not_found(evaluation.rule_id)
            }
            other => other.into(),
        })?;

        Ok(record.into())
    }

    async fn list_evaluations(
        &self,
        user_id: &str,
        rule_id: RuleId,
        limit: usize,
    ) -> DatabaseResult<Vec<RuleEvaluation>> {
        self.ensure_rule_owned(user_id, rule_id).await?;

        let records: Vec<EvaluationRecord> = sqlx::query_as(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM rule_evaluations WHERE rule_id = $1 \
             ORDER BY evaluated_at DESC, id DESC LIMIT $2"
        ))
        .bind(rule_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(RuleEvaluation::from).collect())
    }

    #[instrument(skip(self))]
    async fn prune_evaluations(&self, older_than: DateTime<Utc>) -> DatabaseResult<u64> {
        let rows = sqlx::query("DELETE FROM rule_evaluations WHERE evaluated_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows)
    }

    #[instrument(skip(self, request), fields(rule_id = %request.rule_id))]
    async fn fire_alert(&self, request: FireRequest) -> DatabaseResult<FireOutcome> {
        // TIMESTAMPTZ keeps microseconds; sibling alerts must compare equal to `now`.
        let now = request.now.trunc_subsecs(6);
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent firings of the same rule.
        let locked: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM rules WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(request.rule_id)
        .bind(&request.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(DatabaseError::rule_not_found(request.rule_id));
        }

        sqlx::query("UPDATE rules SET last_triggered_at = $2 WHERE id = $1")
            .bind(request.rule_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if let Some(cooldown) = request.cooldown {
            let existing: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM alerts WHERE rule_id = $1 AND NOT acknowledged \
                 AND created_at > $2 AND created_at < $3 \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(request.rule_id)
            .bind(now - cooldown)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                tx.commit().await?;
                debug!(existing = %existing, "Alert suppressed by cooldown");
                return Ok(FireOutcome::Suppressed { existing });
            }
        }

        let record: AlertRecord = sqlx::query_as(&format!(
            "INSERT INTO alerts (id, rule_id, user_id, message, severity, created_at, metrics) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ALERT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.rule_id)
        .bind(&request.user_id)
        .bind(&request.message)
        .bind(request.severity.as_str())
        .bind(now)
        .bind(request.metrics.as_ref().map(Json))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(FireOutcome::Created(Alert::try_from(record)?))
    }

    async fn list_alerts(
        &self,
        user_id: &str,
        acknowledged: Option<bool>,
    ) -> DatabaseResult<Vec<Alert>> {
        let records: Vec<AlertRecord> = sqlx::query_as(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE user_id = $1 \
             AND ($2::BOOLEAN IS NULL OR acknowledged = $2) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(acknowledged)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Alert::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn acknowledge_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<Alert> {
        let record: AlertRecord = sqlx::query_as(&format!(
            "UPDATE alerts SET acknowledged = TRUE, acknowledged_at = COALESCE(acknowledged_at, NOW()) \
             WHERE id = $1 AND user_id = $2 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::alert_not_found(alert_id))?;

        Alert::try_from(record)
    }

    #[instrument(skip(self))]
    async fn acknowledge_all_alerts(&self, user_id: &str) -> DatabaseResult<u64> {
        let rows = sqlx::query(
            "UPDATE alerts SET acknowledged = TRUE, acknowledged_at = NOW() \
             WHERE user_id = $1 AND NOT acknowledged",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<()> {
        let rows = sqlx::query("DELETE FROM alerts WHERE id = $1 AND user_id = $2")
            .bind(alert_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(DatabaseError::alert_not_found(alert_id));
        }
        Ok(())
    }

    async fn alert_stats(&self, user_id: &str, now: DateTime<Utc>) -> DatabaseResult<AlertStats> {
        let record: AlertStatsRecord = sqlx::query_as(
            "SELECT \
                COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE NOT acknowledged) AS unacknowledged, \
                COUNT(*) FILTER (WHERE severity = 'high') AS high_severity, \
                COUNT(*) FILTER (WHERE created_at >= $2) AS last_24h \
             FROM alerts WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(now - Duration::hours(24))
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertStats {
            total: record.total as u64,
            unacknowledged: record.unacknowledged as u64,
            high_severity: record.high_severity as u64,
            last_24h: record.last_24h as u64,
        })
    }
}
