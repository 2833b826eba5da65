//! End-to-end behaviour of the public engine facade

use chainwatch::prelude::*;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn metrics(stablecoin_pct: f64, pnl_pct: f64) -> chainwatch_core::PortfolioMetrics {
    chainwatch_core::PortfolioMetrics {
        total_usd_value: 10_000.0,
        daily_pnl_pct: pnl_pct,
        stablecoin_allocation_pct: stablecoin_pct,
        largest_position_pct: 40.0,
        allocations: vec![],
        as_of: Utc::now(),
    }
}

fn engine(
    provider: Arc<StaticMetricsProvider>,
    oracle: StaticOracle,
    cooldown_secs: u64,
) -> Chainwatch {
    Chainwatch::builder()
        .metrics_provider(provider)
        .oracle(Arc::new(oracle))
        .engine_config(EngineConfig {
            alert_cooldown_secs: cooldown_secs,
            ..Default::default()
        })
        .build()
        .unwrap()
}

fn stablecoin_definition() -> serde_json::Value {
    json!({
        "triggers": [{"metric": "stablecoin_allocation_pct", "operator": "<", "value": 30}],
        "logic": "ANY",
        "actions": [{"type": "ALERT", "message": "Stablecoin allocation below 30%", "severity": "medium"}]
    })
}

#[tokio::test]
async fn test_rule_to_alert_lifecycle() {
    let provider = Arc::new(StaticMetricsProvider::new().with_metrics("alice", metrics(20.0, 0.0)));
    let engine = engine(provider, StaticOracle::default(), 3600);

    let rule = engine
        .create_rule("alice", "Stablecoin floor", "", &stablecoin_definition())
        .await
        .unwrap();

    let outcome = engine.run_tick().await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.alerts_created, 1);

    let evaluations = engine.list_evaluations("alice", rule.id, 10).await.unwrap();
    assert_eq!(evaluations.len(), 1);
    assert!(evaluations[0].triggered);

    let open = engine.list_alerts("alice", Some(false)).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].severity, Severity::Medium);
    assert_eq!(open[0].message, "Stablecoin allocation below 30%");

    // Acknowledging twice leaves the first timestamp in place
    let first = engine.acknowledge_alert("alice", open[0].id).await.unwrap();
    let second = engine.acknowledge_alert("alice", open[0].id).await.unwrap();
    assert!(first.acknowledged);
    assert_eq!(first.acknowledged_at, second.acknowledged_at);

    assert_eq!(engine.acknowledge_all_alerts("alice").await.unwrap(), 0);

    let stats = engine.alert_stats("alice").await.unwrap();
    assert_eq!(
        stats,
        AlertStats {
            total: 1,
            unacknowledged: 0,
            high_severity: 0,
            last_24h: 1,
        }
    );

    engine.delete_alert("alice", open[0].id).await.unwrap();
    assert_eq!(engine.alert_stats("alice").await.unwrap().total, 0);
}

#[tokio::test]
async fn test_deactivated_rule_stays_quiet() {
    let provider = Arc::new(StaticMetricsProvider::new().with_metrics("alice", metrics(20.0, 0.0)));
    let engine = engine(provider, StaticOracle::default(), 0);

    let rule = engine
        .create_rule("alice", "Stablecoin floor", "", &stablecoin_definition())
        .await
        .unwrap();
    let rule = engine.set_rule_active("alice", rule.id, false).await.unwrap();
    assert!(!rule.is_active);

    engine.run_tick().await.unwrap();
    assert!(engine.list_evaluations("alice", rule.id, 10).await.unwrap().is_empty());
    assert!(engine.list_alerts("alice", None).await.unwrap().is_empty());

    engine.set_rule_active("alice", rule.id, true).await.unwrap();
    engine.run_tick().await.unwrap();
    assert_eq!(engine.list_alerts("alice", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_compile_and_replace() {
    let provider = Arc::new(StaticMetricsProvider::new().with_metrics("alice", metrics(50.0, -6.0)));
    let oracle = StaticOracle::new(
        r#"{"triggers": [{"metric": "daily_pnl_pct", "operator": "<", "value": -5}], "logic": "ANY", "actions": [{"type": "ALERT", "message": "Daily PnL below -5%"}]}"#,
    );
    let engine = engine(provider, oracle, 3600);

    let rule = engine
        .compile_rule("alice", "Alert me if daily PnL drops below -5%", Some("PnL guard"))
        .await
        .unwrap();
    assert_eq!(rule.name, "PnL guard");
    assert_eq!(rule.description, "Alert me if daily PnL drops below -5%");

    let preview = engine.preview_rule("alice", rule.id).await.unwrap();
    assert!(preview.triggered);

    let mut stricter = json!({
        "triggers": [{"metric": "daily_pnl_pct", "operator": "<", "value": -10}],
        "logic": "ANY",
        "actions": [{"type": "ALERT", "message": "Daily PnL below -10%", "severity": "high"}]
    });
    let replaced = engine
        .replace_rule_definition("alice", rule.id, &stricter)
        .await
        .unwrap();
    assert_eq!(replaced.definition.triggers()[0].value, -10.0);
    assert!(!engine.preview_rule("alice", rule.id).await.unwrap().triggered);

    stricter["triggers"][0]["operator"] = json!("==");
    let err = engine
        .replace_rule_definition("alice", rule.id, &stricter)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainwatchError::Validation(_)));

    engine.delete_rule("alice", rule.id).await.unwrap();
    assert!(engine.get_rule("alice", rule.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_other_users_resources_are_not_found() {
    let provider = Arc::new(StaticMetricsProvider::new().with_metrics("alice", metrics(20.0, 0.0)));
    let engine = engine(provider, StaticOracle::default(), 0);

    let rule = engine
        .create_rule("alice", "Stablecoin floor", "", &stablecoin_definition())
        .await
        .unwrap();
    engine.run_tick().await.unwrap();
    let alert = engine.list_alerts("alice", None).await.unwrap().remove(0);

    assert!(engine.get_rule("mallory", rule.id).await.unwrap_err().is_not_found());
    assert!(engine
        .set_rule_active("mallory", rule.id, false)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(engine
        .list_evaluations("mallory", rule.id, 10)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(engine
        .acknowledge_alert("mallory", alert.id)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(engine.delete_alert("mallory", alert.id).await.unwrap_err().is_not_found());
    assert!(engine.list_alerts("mallory", None).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ticks_until_stopped() {
    let provider = Arc::new(StaticMetricsProvider::new().with_metrics("alice", metrics(20.0, 0.0)));
    let engine = Chainwatch::builder()
        .metrics_provider(provider)
        .engine_config(EngineConfig {
            tick_interval_secs: 10,
            alert_cooldown_secs: 0,
            ..Default::default()
        })
        .build()
        .unwrap();

    let rule = engine
        .create_rule("alice", "Stablecoin floor", "", &stablecoin_definition())
        .await
        .unwrap();

    let handle = engine.start_scheduler();
    assert!(handle.is_running());

    // Ticks fire at t=0, 10s and 20s
    tokio::time::sleep(Duration::from_secs(25)).await;
    handle.stop().await;

    let evaluations = engine.list_evaluations("alice", rule.id, 100).await.unwrap();
    assert_eq!(evaluations.len(), 3);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        engine.list_evaluations("alice", rule.id, 100).await.unwrap().len(),
        3
    );
}
