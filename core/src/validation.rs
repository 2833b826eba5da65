//! Validation of candidate rule definitions.
//!
//! Candidates arrive as untyped JSON, either from the natural-language
//! compiler or from a direct API call. Every field is checked explicitly so
//! the error names the offending path; nothing is coerced or defaulted except
//! an absent alert severity.

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::types::{Action, Logic, Metric, Operator, RuleDefinition, Scope, Severity, Trigger};

impl TryFrom<&Value> for RuleDefinition {
    type Error = ValidationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        parse_rule_definition(value)
    }
}

/// Parses and validates a candidate rule definition.
pub fn parse_rule_definition(value: &Value) -> Result<RuleDefinition, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new("definition", "expected a JSON object"))?;

    let triggers = required_array(object, "triggers")?
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_trigger(raw).map_err(|e| e.within(format!("triggers[{}]", i))))
        .collect::<Result<Vec<_>, _>>()?;

    let logic = required_str(object, "logic")?.parse::<Logic>()?;

    let scope = match object.get("scope") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(parse_scope(raw).map_err(|e| e.within("scope"))?),
    };

    let actions = required_array(object, "actions")?
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_action(raw).map_err(|e| e.within(format!("actions[{}]", i))))
        .collect::<Result<Vec<_>, _>>()?;

    RuleDefinition::new(triggers, logic, scope, actions)
}

fn parse_trigger(value: &Value) -> Result<Trigger, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new("trigger", "expected a JSON object"))?;

    let metric = required_str(object, "metric")?.parse::<Metric>()?;
    let operator = required_str(object, "operator")?.parse::<Operator>()?;

    let value = object
        .get("value")
        .ok_or_else(|| ValidationError::new("value", "field is required"))?
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::new("value", "expected a finite number"))?;

    let timeframe = match object.get("timeframe") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(_) => {
            return Err(ValidationError::new(
                "timeframe",
                "expected a non-empty string",
            ))
        }
    };

    Ok(Trigger {
        metric,
        operator,
        value,
        timeframe,
    })
}

fn parse_action(value: &Value) -> Result<Action, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new("action", "expected a JSON object"))?;

    let kind = required_str(object, "type")?;
    if kind != "ALERT" {
        return Err(ValidationError::new(
            "type",
            format!("unsupported action '{}', only ALERT is allowed", kind),
        ));
    }

    let message = required_str(object, "message")?.trim();
    if message.is_empty() {
        return Err(ValidationError::new("message", "alert message cannot be empty"));
    }

    let severity = match object.get("severity") {
        None | Some(Value::Null) => Severity::default(),
        Some(Value::String(s)) => s.parse::<Severity>()?,
        Some(_) => return Err(ValidationError::new("severity", "expected a string")),
    };

    Ok(Action::alert(message, severity))
}

fn parse_scope(value: &Value) -> Result<Scope, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::new("scope", "expected a JSON object"))?;

    Ok(Scope {
        accounts: optional_string_list(object, "accounts")?,
        chains: optional_string_list(object, "chains")?,
    })
}

fn required_array<'a>(
    object: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Vec<Value>, ValidationError> {
    match object.get(field) {
        Some(Value::Array(items)) if !items.is_empty() => Ok(items),
        Some(Value::Array(_)) => Err(ValidationError::new(field, "must not be empty")),
        Some(_) => Err(ValidationError::new(field, "expected an array")),
        None => Err(ValidationError::new(field, "field is required")),
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, ValidationError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ValidationError::new(field, "expected a string")),
        None => Err(ValidationError::new(field, "field is required")),
    }
}

fn optional_string_list(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Vec<String>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ValidationError::new(format!("{}[{}]", field, i), "expected a string"))
            })
            .collect(),
        Some(_) => Err(ValidationError::new(field, "expected an array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "triggers": [
                {"metric": "stablecoin_allocation_pct", "operator": "<", "value": 30}
            ],
            "logic": "ANY",
            "actions": [
                {"type": "ALERT", "message": "Stablecoin allocation below 30%", "severity": "medium"}
            ]
        })
    }

    #[test]
    fn test_accepts_valid_definition() {
        let definition = parse_rule_definition(&valid()).unwrap();
        assert_eq!(definition.triggers().len(), 1);
        assert_eq!(definition.triggers()[0].metric, Metric::StablecoinAllocationPct);
        assert_eq!(definition.triggers()[0].operator, Operator::LessThan);
        assert_eq!(definition.triggers()[0].value, 30.0);
        assert_eq!(definition.logic(), Logic::Any);
        assert_eq!(
            definition.actions()[0],
            Action::alert("Stablecoin allocation below 30%", Severity::Medium)
        );
    }

    #[test]
    fn test_unknown_metric_names_field() {
        let mut candidate = valid();
        candidate["triggers"][0]["metric"] = json!("portfolio_beta");
        let err = parse_rule_definition(&candidate).unwrap_err();
        assert_eq!(err.field, "triggers[0].metric");
    }

    #[test]
    fn test_operator_is_not_coerced() {
        let mut candidate = valid();
        candidate["triggers"][0]["operator"] = json!("==");
        let err = parse_rule_definition(&candidate).unwrap_err();
        assert_eq!(err.field, "triggers[0].operator");
    }

    #[test]
    fn test_logic_must_be_exact() {
        let mut candidate = valid();
        candidate["logic"] = json!("any");
        assert_eq!(parse_rule_definition(&candidate).unwrap_err().field, "logic");

        candidate.as_object_mut().unwrap().remove("logic");
        assert_eq!(parse_rule_definition(&candidate).unwrap_err().field, "logic");
    }

    #[test]
    fn test_empty_lists_rejected() {
        let mut candidate = valid();
        candidate["triggers"] = json!([]);
        assert_eq!(parse_rule_definition(&candidate).unwrap_err().field, "triggers");

        let mut candidate = valid();
        candidate["actions"] = json!([]);
        assert_eq!(parse_rule_definition(&candidate).unwrap_err().field, "actions");
    }

    #[test]
    fn test_value_must_be_numeric() {
        let mut candidate = valid();
        candidate["triggers"][0]["value"] = json!("30");
        assert_eq!(
            parse_rule_definition(&candidate).unwrap_err().field,
            "triggers[0].value"
        );
    }

    #[test]
    fn test_action_shape() {
        let mut candidate = valid();
        candidate["actions"][0]["type"] = json!("WEBHOOK");
        assert_eq!(
            parse_rule_definition(&candidate).unwrap_err().field,
            "actions[0].type"
        );

        let mut candidate = valid();
        candidate["actions"][0]["severity"] = json!("critical");
        assert_eq!(
            parse_rule_definition(&candidate).unwrap_err().field,
            "actions[0].severity"
        );

        let mut candidate = valid();
        candidate["actions"][0].as_object_mut().unwrap().remove("severity");
        let definition = parse_rule_definition(&candidate).unwrap();
        assert_eq!(definition.alert_actions().next().unwrap().1, Severity::Medium);
    }

    #[test]
    fn test_scope_and_timeframe() {
        let mut candidate = valid();
        candidate["scope"] = json!({"chains": ["ethereum", "base"]});
        candidate["triggers"][0]["timeframe"] = json!("24h");
        let definition = parse_rule_definition(&candidate).unwrap();
        assert_eq!(definition.scope().unwrap().chains, vec!["ethereum", "base"]);
        assert_eq!(definition.triggers()[0].timeframe.as_deref(), Some("24h"));

        candidate["scope"] = json!({"accounts": [1, 2]});
        assert_eq!(
            parse_rule_definition(&candidate).unwrap_err().field,
            "scope.accounts[0]"
        );
    }

    #[test]
    fn test_try_from_value() {
        let definition = RuleDefinition::try_from(&valid()).unwrap();
        assert_eq!(definition.logic(), Logic::Any);
        assert!(RuleDefinition::try_from(&json!("not an object")).is_err());
    }
}
