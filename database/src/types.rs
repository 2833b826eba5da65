//! Database row types
//!
//! Row shapes as they come back from PostgreSQL, and their conversions into
//! the domain types. Definitions and snapshots are stored as JSONB.

use chainwatch_core::{Alert, PortfolioMetrics, Rule, RuleDefinition, RuleEvaluation};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Rule record stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct RuleRecord {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub original_text: Option<String>,
    pub definition: Json<RuleDefinition>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl From<RuleRecord> for Rule {
    fn from(row: RuleRecord) -> Self {
        Rule {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            original_text: row.original_text,
            definition: row.definition.0,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_triggered_at: row.last_triggered_at,
        }
    }
}

/// Evaluation audit record
#[derive(Debug, Clone, FromRow)]
pub struct EvaluationRecord {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub triggered: bool,
    pub metrics: Option<Json<PortfolioMetrics>>,
    pub trigger_results: Vec<bool>,
    pub error: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl From<EvaluationRecord> for RuleEvaluation {
    fn from(row: EvaluationRecord) -> Self {
        RuleEvaluation {
            id: row.id,
            rule_id: row.rule_id,
            triggered: row.triggered,
            metrics: row.metrics.map(|m| m.0),
            trigger_results: row.trigger_results,
            error: row.error,
            evaluated_at: row.evaluated_at,
        }
    }
}

/// Alert record; severity is stored as its lowercase name
#[derive(Debug, Clone, FromRow)]
pub struct AlertRecord {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub user_id: String,
    pub message: String,
    pub severity: String,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metrics: Option<Json<PortfolioMetrics>>,
}

impl TryFrom<AlertRecord> for Alert {
    type Error = DatabaseError;

    fn try_from(row: AlertRecord) -> Result<Self, Self::Error> {
        let severity = row
            .severity
            .parse()
            .map_err(|e| DatabaseError::Serialization(format!("alert {}: {}", row.id, e)))?;

        Ok(Alert {
            id: row.id,
            rule_id: row.rule_id,
            user_id: row.user_id,
            message: row.message,
            severity,
            acknowledged: row.acknowledged,
            acknowledged_at: row.acknowledged_at,
            created_at: row.created_at,
            metrics: row.metrics.map(|m| m.0),
        })
    }
}

/// Aggregate counts returned by the alert statistics query
#[derive(Debug, Clone, Copy, FromRow)]
pub struct AlertStatsRecord {
    pub total: i64,
    pub unacknowledged: i64,
    pub high_severity: i64,
    pub last_24h: i64,
}
