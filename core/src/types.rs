//! Core rule and alert types for the Chainwatch engine.
//!
//! Everything in this module is plain data: the evaluator, the compiler and
//! the stores all exchange these structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifiers for persisted entities
pub type RuleId = Uuid;
pub type AlertId = Uuid;
pub type EvaluationId = Uuid;

/// Owning user identifier (opaque, issued by the surrounding system)
pub type UserId = String;

/// Portfolio metrics a trigger can reference.
///
/// The set is closed: [`Metric::resolve`] is a total mapping over
/// [`PortfolioMetrics`], so an unknown metric can only ever be a validation
/// error and never a silent zero at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Total portfolio value in USD
    TotalUsdValue,
    /// Percentage change of the portfolio value over the last day
    DailyPnlPct,
    /// Share of the portfolio held in stablecoins, in percent
    StablecoinAllocationPct,
    /// Share of the portfolio held in the single largest position, in percent
    LargestPositionPct,
}

impl Metric {
    /// Every supported metric, in prompt order
    pub const ALL: [Metric; 4] = [
        Metric::TotalUsdValue,
        Metric::DailyPnlPct,
        Metric::StablecoinAllocationPct,
        Metric::LargestPositionPct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalUsdValue => "total_usd_value",
            Metric::DailyPnlPct => "daily_pnl_pct",
            Metric::StablecoinAllocationPct => "stablecoin_allocation_pct",
            Metric::LargestPositionPct => "largest_position_pct",
        }
    }

    /// Reads this metric's value out of a snapshot
    pub fn resolve(&self, metrics: &PortfolioMetrics) -> f64 {
        match self {
            Metric::TotalUsdValue => metrics.total_usd_value,
            Metric::DailyPnlPct => metrics.daily_pnl_pct,
            Metric::StablecoinAllocationPct => metrics.stablecoin_allocation_pct,
            Metric::LargestPositionPct => metrics.largest_position_pct,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(
                    "metric",
                    format!(
                        "unknown metric '{}', expected one of: {}",
                        s,
                        Metric::ALL.map(|m| m.as_str()).join(", ")
                    ),
                )
            })
    }
}

/// Comparison operators available to triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::LessThan,
        Operator::GreaterThan,
        Operator::Equal,
        Operator::LessOrEqual,
        Operator::GreaterOrEqual,
        Operator::NotEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::Equal => "=",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::NotEqual => "!=",
        }
    }

    /// Applies the comparison `lhs <op> rhs` with IEEE-754 semantics.
    ///
    /// `=` and `!=` are exact; no epsilon is applied.
    #[allow(clippy::float_cmp)]
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::LessThan => lhs < rhs,
            Operator::GreaterThan => lhs > rhs,
            Operator::Equal => lhs == rhs,
            Operator::LessOrEqual => lhs <= rhs,
            Operator::GreaterOrEqual => lhs >= rhs,
            Operator::NotEqual => lhs != rhs,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(
                    "operator",
                    format!("unknown operator '{}', expected one of: < > = <= >= !=", s),
                )
            })
    }
}

/// How the results of a rule's triggers are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    /// Every trigger must hold
    All,
    /// At least one trigger must hold
    Any,
}

impl Logic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Logic::All => "ALL",
            Logic::Any => "ANY",
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Logic {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL" => Ok(Logic::All),
            "ANY" => Ok(Logic::Any),
            other => Err(ValidationError::new(
                "logic",
                format!("unknown logic '{}', expected ALL or ANY", other),
            )),
        }
    }
}

/// Alert severity levels
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(ValidationError::new(
                "severity",
                format!("unknown severity '{}', expected low, medium or high", other),
            )),
        }
    }
}

/// A single comparison evaluated against a portfolio snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub metric: Metric,
    pub operator: Operator,
    pub value: f64,
    /// Free-form window label such as "24h"; carried for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

impl Trigger {
    pub fn new(metric: Metric, operator: Operator, value: f64) -> Self {
        Self {
            metric,
            operator,
            value,
            timeframe: None,
        }
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }
}

/// Restricts a rule to a subset of the user's accounts and chains
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<String>,
}

impl Scope {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.chains.is_empty()
    }
}

/// What happens when a rule fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "ALERT")]
    Alert {
        message: String,
        #[serde(default)]
        severity: Severity,
    },
}

impl Action {
    pub fn alert(message: impl Into<String>, severity: Severity) -> Self {
        Action::Alert {
            message: message.into(),
            severity,
        }
    }
}

/// Validated, structured representation of a monitoring condition.
///
/// Immutable once created; a rule's definition changes only by full
/// replacement.
///
/// Deserialization goes through [`RuleDefinition::new`], so a stored or
/// transmitted definition that breaks the invariants is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRuleDefinition")]
pub struct RuleDefinition {
    triggers: Vec<Trigger>,
    logic: Logic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<Scope>,
    actions: Vec<Action>,
}

/// Unchecked wire shape of [`RuleDefinition`]
#[derive(Deserialize)]
struct RawRuleDefinition {
    triggers: Vec<Trigger>,
    logic: Logic,
    #[serde(default)]
    scope: Option<Scope>,
    actions: Vec<Action>,
}

impl TryFrom<RawRuleDefinition> for RuleDefinition {
    type Error = ValidationError;

    fn try_from(raw: RawRuleDefinition) -> Result<Self, Self::Error> {
        RuleDefinition::new(raw.triggers, raw.logic, raw.scope, raw.actions)
    }
}

impl RuleDefinition {
    /// Builds a definition, enforcing the structural invariants
    pub fn new(
        triggers: Vec<Trigger>,
        logic: Logic,
        scope: Option<Scope>,
        actions: Vec<Action>,
    ) -> Result<Self, ValidationError> {
        if triggers.is_empty() {
            return Err(ValidationError::new(
                "triggers",
                "at least one trigger is required",
            ));
        }
        for (i, trigger) in triggers.iter().enumerate() {
            if !trigger.value.is_finite() {
                return Err(ValidationError::new(
                    format!("triggers[{}].value", i),
                    "value must be a finite number",
                ));
            }
        }
        if actions.is_empty() {
            return Err(ValidationError::new(
                "actions",
                "at least one action is required",
            ));
        }
        for (i, action) in actions.iter().enumerate() {
            let Action::Alert { message, .. } = action;
            if message.trim().is_empty() {
                return Err(ValidationError::new(
                    format!("actions[{}].message", i),
                    "alert message cannot be empty",
                ));
            }
        }

        Ok(Self {
            triggers,
            logic,
            scope: scope.filter(|s| !s.is_empty()),
            actions,
        })
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn logic(&self) -> Logic {
        self.logic
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Message and severity of every ALERT action, in order
    pub fn alert_actions(&self) -> impl Iterator<Item = (&str, Severity)> + '_ {
        self.actions.iter().map(|action| match action {
            Action::Alert { message, severity } => (message.as_str(), *severity),
        })
    }
}

/// A persisted rule owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub user_id: UserId,
    pub name: String,
    pub description: String,
    /// Natural-language text the rule was compiled from, if any
    pub original_text: Option<String>,
    pub definition: RuleDefinition,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time the rule's triggers held, whether or not an alert was created
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// Input for creating a rule
#[derive(Debug, Clone)]
pub struct NewRule {
    pub user_id: UserId,
    pub name: String,
    pub description: String,
    pub original_text: Option<String>,
    pub definition: RuleDefinition,
}

/// Allocation of a single asset within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    pub usd_value: f64,
    pub pct: f64,
}

/// Point-in-time portfolio snapshot supplied by the metrics provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_usd_value: f64,
    pub daily_pnl_pct: f64,
    pub stablecoin_allocation_pct: f64,
    pub largest_position_pct: f64,
    /// Per-asset allocations ranked by value, largest first
    #[serde(default)]
    pub allocations: Vec<AssetAllocation>,
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl PortfolioMetrics {
    pub fn value_of(&self, metric: Metric) -> f64 {
        metric.resolve(self)
    }
}

/// Append-only audit record of a single rule evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub id: EvaluationId,
    pub rule_id: RuleId,
    pub triggered: bool,
    pub metrics: Option<PortfolioMetrics>,
    pub trigger_results: Vec<bool>,
    /// Set when the evaluation could not be carried out
    pub error: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl RuleEvaluation {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Input for recording an evaluation
#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub rule_id: RuleId,
    pub triggered: bool,
    pub metrics: Option<PortfolioMetrics>,
    pub trigger_results: Vec<bool>,
    pub error: Option<String>,
}

impl NewEvaluation {
    /// Evaluation that completed against a snapshot
    pub fn completed(
        rule_id: RuleId,
        triggered: bool,
        metrics: PortfolioMetrics,
        trigger_results: Vec<bool>,
    ) -> Self {
        Self {
            rule_id,
            triggered,
            metrics: Some(metrics),
            trigger_results,
            error: None,
        }
    }

    /// Evaluation that could not run, carrying the error marker
    pub fn failed(rule_id: RuleId, error: impl Into<String>) -> Self {
        Self {
            rule_id,
            triggered: false,
            metrics: None,
            trigger_results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A durable, acknowledgeable alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub rule_id: RuleId,
    pub user_id: UserId,
    pub message: String,
    pub severity: Severity,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Snapshot that caused the rule to fire
    pub metrics: Option<PortfolioMetrics>,
}

/// Request to materialize an alert for a firing rule
#[derive(Debug, Clone)]
pub struct FireRequest {
    pub rule_id: RuleId,
    pub user_id: UserId,
    pub message: String,
    pub severity: Severity,
    pub metrics: Option<PortfolioMetrics>,
    /// Suppression window; `None` disables suppression
    pub cooldown: Option<chrono::Duration>,
    /// Instant of the firing, shared by every action of the rule
    pub now: DateTime<Utc>,
}

/// Result of a fire request
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// A new alert was created
    Created(Alert),
    /// An unacknowledged alert inside the cooldown window already exists
    Suppressed { existing: AlertId },
}

impl FireOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, FireOutcome::Created(_))
    }
}

/// Aggregate alert counts for a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub unacknowledged: u64,
    pub high_severity: u64,
    pub last_24h: u64,
}
