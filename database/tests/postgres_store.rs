//! PostgreSQL store integration tests.
//!
//! These need a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use chainwatch_core::{
    Action, FireOutcome, FireRequest, Logic, Metric, NewEvaluation, NewRule, Operator,
    RuleDefinition, Severity, Trigger,
};
use chainwatch_database::{DatabaseConfig, DatabaseError, DatabaseManager, PgStore, RuleStore};
use chrono::{Duration, Utc};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let manager = DatabaseManager::new(DatabaseConfig::postgres(url))
        .await
        .expect("connect");
    PgStore::open(&manager).await.expect("migrate")
}

fn new_rule(user_id: &str) -> NewRule {
    NewRule {
        user_id: user_id.to_string(),
        name: "Stablecoin floor".to_string(),
        description: "Stablecoin allocation below 30%".to_string(),
        original_text: Some("alert me if stablecoins drop below 30%".to_string()),
        definition: RuleDefinition::new(
            vec![Trigger::new(
                Metric::StablecoinAllocationPct,
                Operator::LessThan,
                30.0,
            )],
            Logic::Any,
            None,
            vec![Action::alert("Stablecoin allocation below 30%", Severity::Medium)],
        )
        .unwrap(),
    }
}

fn unique_user() -> String {
    format!("pg-test-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_rule_round_trip_and_ownership() {
    let store = store().await;
    let user = unique_user();

    let rule = store.create_rule(new_rule(&user)).await.unwrap();
    let fetched = store.get_rule(&user, rule.id).await.unwrap();
    assert_eq!(fetched.definition, rule.definition);
    assert!(fetched.is_active);

    assert!(matches!(
        store.get_rule("someone-else", rule.id).await,
        Err(DatabaseError::NotFound(_))
    ));

    let paused = store.set_rule_active(&user, rule.id, false).await.unwrap();
    assert!(!paused.is_active);
    assert!(store
        .list_active_rules()
        .await
        .unwrap()
        .iter()
        .all(|r| r.id != rule.id));

    store.delete_rule(&user, rule.id).await.unwrap();
    assert!(store.list_rules(&user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_fire_alert_cooldown_and_acknowledge() {
    let store = store().await;
    let user = unique_user();
    let rule = store.create_rule(new_rule(&user)).await.unwrap();
    let now = Utc::now();

    let request = |at| FireRequest {
        rule_id: rule.id,
        user_id: user.clone(),
        message: "Stablecoin allocation below 30%".to_string(),
        severity: Severity::Medium,
        metrics: None,
        cooldown: Some(Duration::hours(1)),
        now: at,
    };

    let FireOutcome::Created(alert) = store.fire_alert(request(now)).await.unwrap() else {
        panic!("expected a new alert");
    };
    assert_eq!(
        store
            .fire_alert(request(now + Duration::seconds(30)))
            .await
            .unwrap(),
        FireOutcome::Suppressed { existing: alert.id }
    );

    let acked = store.acknowledge_alert(&user, alert.id).await.unwrap();
    let again = store.acknowledge_alert(&user, alert.id).await.unwrap();
    assert_eq!(acked.acknowledged_at, again.acknowledged_at);

    assert!(store
        .fire_alert(request(now + Duration::seconds(60)))
        .await
        .unwrap()
        .is_created());
    assert_eq!(store.acknowledge_all_alerts(&user).await.unwrap(), 1);
    assert_eq!(store.acknowledge_all_alerts(&user).await.unwrap(), 0);

    let stats = store.alert_stats(&user, Utc::now()).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.unacknowledged, 0);

    store
        .record_evaluation(NewEvaluation::failed(rule.id, "metrics timeout"))
        .await
        .unwrap();
    assert_eq!(
        store
            .list_evaluations(&user, rule.id, 10)
            .await
            .unwrap()
            .len(),
        1
    );

    store.delete_rule(&user, rule.id).await.unwrap();
    assert!(store.list_alerts(&user, None).await.unwrap().is_empty());
}
