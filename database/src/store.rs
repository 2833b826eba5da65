//! Storage abstraction shared by every backend.

use async_trait::async_trait;
use chainwatch_core::{
    Alert, AlertId, AlertStats, FireOutcome, FireRequest, NewEvaluation, NewRule, Rule,
    RuleDefinition, RuleEvaluation, RuleId,
};
use chrono::{DateTime, Utc};

use crate::error::DatabaseResult;

/// Persistence for rules, evaluation history and alerts.
///
/// Every operation that takes a `user_id` enforces ownership: an id that
/// exists but belongs to another user is reported as
/// [`DatabaseError::NotFound`](crate::DatabaseError::NotFound). Listings are
/// returned newest first.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Persists a new, active rule under a freshly generated id
    async fn create_rule(&self, rule: NewRule) -> DatabaseResult<Rule>;

    async fn get_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<Rule>;

    async fn list_rules(&self, user_id: &str) -> DatabaseResult<Vec<Rule>>;

    /// Active rules across all users
    async fn list_active_rules(&self) -> DatabaseResult<Vec<Rule>>;

    async fn set_rule_active(
        &self,
        user_id: &str,
        rule_id: RuleId,
        active: bool,
    ) -> DatabaseResult<Rule>;

    async fn replace_rule_definition(
        &self,
        user_id: &str,
        rule_id: RuleId,
        definition: RuleDefinition,
    ) -> DatabaseResult<Rule>;

    /// Deletes a rule together with its evaluations and alerts
    async fn delete_rule(&self, user_id: &str, rule_id: RuleId) -> DatabaseResult<()>;

    async fn record_evaluation(&self, evaluation: NewEvaluation) -> DatabaseResult<RuleEvaluation>;

    async fn list_evaluations(
        &self,
        user_id: &str,
        rule_id: RuleId,
        limit: usize,
    ) -> DatabaseResult<Vec<RuleEvaluation>>;

    /// Removes evaluations recorded before `older_than`, returning how many were removed
    async fn prune_evaluations(&self, older_than: DateTime<Utc>) -> DatabaseResult<u64>;

    /// Records that the rule fired and creates an alert unless an
    /// unacknowledged alert for the rule is still inside the cooldown window.
    ///
    /// The check and the insert happen atomically. Alerts created at exactly
    /// `request.now` belong to the same firing and never suppress each other,
    /// so every action of a rule is materialized together or not at all.
    async fn fire_alert(&self, request: FireRequest) -> DatabaseResult<FireOutcome>;

    /// Alerts for a user, optionally filtered by acknowledgment state
    async fn list_alerts(
        &self,
        user_id: &str,
        acknowledged: Option<bool>,
    ) -> DatabaseResult<Vec<Alert>>;

    /// Marks an alert acknowledged; acknowledging twice is a no-op
    async fn acknowledge_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<Alert>;

    /// Acknowledges every open alert of the user, returning how many changed
    async fn acknowledge_all_alerts(&self, user_id: &str) -> DatabaseResult<u64>;

    async fn delete_alert(&self, user_id: &str, alert_id: AlertId) -> DatabaseResult<()>;

    async fn alert_stats(&self, user_id: &str, now: DateTime<Utc>) -> DatabaseResult<AlertStats>;
}
