//! Integration tests for the OpenRouter oracle and the compiler on top of it
//!
//! Uses wiremock for HTTP mocking.

use rule_compiler::*;
use secrecy::Secret;
use std::sync::Arc;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn oracle_for(server: &MockServer) -> OpenRouterOracle {
    OpenRouterOracle::new(OpenRouterConfig {
        api_key: Secret::new("test_key".to_string()),
        base_url: format!("{}/api/v1", server.uri()),
        model: "test/model".to_string(),
        temperature: 0.0,
        timeout_secs: 5,
    })
    .unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "gen-123",
        "model": "test/model",
        "choices": [
            {"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

#[tokio::test]
async fn test_generate_returns_first_choice() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("Authorization", "Bearer test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let text = oracle_for(&mock_server).generate("say hello").await.unwrap();
    assert_eq!(text, "hello");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let err = oracle_for(&mock_server).generate("p").await.unwrap_err();
    match err {
        OracleError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_choices_is_empty_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let err = oracle_for(&mock_server).generate("p").await.unwrap_err();
    assert!(matches!(err, OracleError::EmptyResponse));
}

#[tokio::test]
async fn test_compile_through_openrouter() {
    let mock_server = MockServer::start().await;

    let rule = r#"{"triggers": [{"metric": "stablecoin_allocation_pct", "operator": "<", "value": 30}], "logic": "ANY", "actions": [{"type": "ALERT", "message": "Stablecoin allocation below 30%", "severity": "medium"}]}"#;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(rule)))
        .mount(&mock_server)
        .await;

    let compiler = RuleCompiler::new(Arc::new(oracle_for(&mock_server)));
    let compiled = compiler
        .compile("Tell me when stablecoins are under 30%", Some("Stablecoin floor"))
        .await
        .unwrap();

    assert_eq!(compiled.name, "Stablecoin floor");
    assert_eq!(compiled.definition.triggers()[0].value, 30.0);
}

#[tokio::test]
async fn test_compile_maps_server_failure_to_oracle_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let compiler = RuleCompiler::new(Arc::new(oracle_for(&mock_server)));
    let err = compiler.compile("anything", None).await.unwrap_err();
    assert!(matches!(err, CompileError::Oracle(OracleError::Status { status: 503, .. })));
}
