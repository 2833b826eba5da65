//! Natural-language rule compiler

use chainwatch_core::{parse_rule_definition, RuleDefinition};
use serde_json::{Deserializer, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{CompileError, OracleError};
use crate::oracle::TextOracle;
use crate::prompt::build_prompt;

pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback names are cut to this many characters of the request text
const NAME_FALLBACK_CHARS: usize = 60;

/// A validated compilation result, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub name: String,
    pub description: String,
    pub definition: RuleDefinition,
}

/// Stateless text-to-rule compiler
#[derive(Clone)]
pub struct RuleCompiler {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl RuleCompiler {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compiles `text` into a rule definition.
    ///
    /// `name` overrides any title the oracle suggests.
    #[instrument(skip(self, text, name), fields(text_len = text.len()))]
    pub async fn compile(&self, text: &str, name: Option<&str>) -> Result<CompiledRule, CompileError> {
        let result = self.compile_inner(text, name).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(CompileError::Oracle(_)) => "oracle_unavailable",
            Err(_) => "rejected",
        };
        metrics::increment_counter!("chainwatch_rule_compilations_total", "outcome" => outcome);

        result
    }

    async fn compile_inner(&self, text: &str, name: Option<&str>) -> Result<CompiledRule, CompileError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CompileError::EmptyInput);
        }

        let prompt = build_prompt(text);
        let response = tokio::time::timeout(self.timeout, self.oracle.generate(&prompt))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        debug!(response_len = response.len(), "Oracle responded");

        let candidate = extract_first_json_object(&response).ok_or_else(|| {
            warn!("Oracle response contained no JSON object");
            CompileError::NoJson
        })?;

        let definition = parse_rule_definition(&Value::Object(candidate.clone())).map_err(|e| {
            warn!(field = %e.field, "Oracle produced an invalid rule");
            CompileError::Invalid(e)
        })?;

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| non_empty_string(&candidate, "name"))
            .unwrap_or_else(|| text.chars().take(NAME_FALLBACK_CHARS).collect());

        let description =
            non_empty_string(&candidate, "description").unwrap_or_else(|| text.to_string());

        info!(
            triggers = definition.triggers().len(),
            logic = %definition.logic(),
            "Rule compiled"
        );

        Ok(CompiledRule {
            name,
            description,
            definition,
        })
    }
}

fn non_empty_string(object: &Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Finds the first well-formed JSON object embedded in `text`.
///
/// Prose and code fences before the object are skipped, as is any `{` that
/// does not open a valid object.
pub fn extract_first_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(object))) => Some(object),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticOracle;
    use chainwatch_core::{Logic, Metric, Operator, Severity};

    const PNL_RESPONSE: &str = r#"Here is your rule:
```json
{"name": "Daily PnL guard", "triggers": [{"metric": "daily_pnl_pct", "operator": "<", "value": -5}], "logic": "ANY", "actions": [{"type": "ALERT", "message": "Daily PnL dropped below -5%", "severity": "high"}]}
```"#;

    fn compiler(oracle: StaticOracle) -> RuleCompiler {
        RuleCompiler::new(Arc::new(oracle))
    }

    #[test]
    fn test_extract_skips_prose_and_broken_braces() {
        let text = r#"Sure {not json} here: {"a": {"b": 1}} trailing {"c": 2}"#;
        let object = extract_first_json_object(text).unwrap();
        assert_eq!(object.get("a").unwrap()["b"], 1);
        assert!(extract_first_json_object("no braces at all").is_none());
        assert!(extract_first_json_object("{ unterminated").is_none());
    }

    #[tokio::test]
    async fn test_compiles_daily_pnl_example() {
        let compiled = compiler(StaticOracle::new(PNL_RESPONSE))
            .compile("Alert me if daily PnL drops below -5%", None)
            .await
            .unwrap();

        let triggers = compiled.definition.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].metric, Metric::DailyPnlPct);
        assert_eq!(triggers[0].operator, Operator::LessThan);
        assert_eq!(triggers[0].value, -5.0);
        assert_eq!(compiled.definition.logic(), Logic::Any);
        assert_eq!(
            compiled.definition.alert_actions().next(),
            Some(("Daily PnL dropped below -5%", Severity::High))
        );
        assert_eq!(compiled.name, "Daily PnL guard");
        assert_eq!(compiled.description, "Alert me if daily PnL drops below -5%");
    }

    #[tokio::test]
    async fn test_caller_name_wins() {
        let compiled = compiler(StaticOracle::new(PNL_RESPONSE))
            .compile("Alert me if daily PnL drops below -5%", Some("  My guard "))
            .await
            .unwrap();
        assert_eq!(compiled.name, "My guard");
    }

    #[tokio::test]
    async fn test_name_falls_back_to_text_prefix() {
        let response = r#"{"triggers": [{"metric": "total_usd_value", "operator": ">", "value": 1000000}], "logic": "ALL", "actions": [{"type": "ALERT", "message": "Portfolio above $1M"}]}"#;
        let text = "Let me know as soon as the whole portfolio, across every wallet I own, is worth more than one million dollars";
        let compiled = compiler(StaticOracle::new(response))
            .compile(text, None)
            .await
            .unwrap();
        assert_eq!(compiled.name.chars().count(), 60);
        assert!(text.starts_with(&compiled.name));
        assert_eq!(
            compiled.definition.alert_actions().next().unwrap().1,
            Severity::Medium
        );
    }

    #[tokio::test]
    async fn test_prose_only_is_rejected() {
        let err = compiler(StaticOracle::new("I'm sorry, I can't help with that."))
            .compile("Alert me if daily PnL drops below -5%", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::NoJson));
    }

    #[tokio::test]
    async fn test_invalid_structure_is_rejected() {
        let response = r#"{"triggers": [{"metric": "portfolio_beta", "operator": "<", "value": 1}], "logic": "ANY", "actions": [{"type": "ALERT", "message": "x"}]}"#;
        let err = compiler(StaticOracle::new(response))
            .compile("alert on beta", None)
            .await
            .unwrap_err();
        match err {
            CompileError::Invalid(e) => assert_eq!(e.field, "triggers[0].metric"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_oracle() {
        let oracle = Arc::new(StaticOracle::new(PNL_RESPONSE));
        let compiler = RuleCompiler::new(oracle.clone());
        assert!(matches!(
            compiler.compile("   ", None).await,
            Err(CompileError::EmptyInput)
        ));
        assert!(oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_unavailable() {
        let err = compiler(StaticOracle::failing("connection refused"))
            .compile("Alert me if daily PnL drops below -5%", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Oracle(OracleError::Transport(_))));
    }

    struct SlowOracle;

    #[async_trait::async_trait]
    impl TextOracle for SlowOracle {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_timeout() {
        let compiler = RuleCompiler::new(Arc::new(SlowOracle)).with_timeout(Duration::from_secs(5));
        let err = compiler.compile("anything", None).await.unwrap_err();
        assert!(matches!(err, CompileError::Oracle(OracleError::Timeout(_))));
    }
}
