//! Prompt sent to the oracle

use chainwatch_core::{Metric, Operator};

const PREAMBLE: &str = "You convert portfolio monitoring requests into JSON rules.\n\
Respond with a single JSON object and nothing else.";

const EXAMPLES: &str = r#"Examples:

Request: Alert me if daily PnL drops below -5%
{"name": "Daily PnL below -5%", "triggers": [{"metric": "daily_pnl_pct", "operator": "<", "value": -5, "timeframe": "24h"}], "logic": "ANY", "actions": [{"type": "ALERT", "message": "Daily PnL dropped below -5%", "severity": "high"}]}

Request: Tell me when my stablecoins fall under 30% of the portfolio on Ethereum
{"name": "Stablecoin floor on Ethereum", "triggers": [{"metric": "stablecoin_allocation_pct", "operator": "<", "value": 30}], "logic": "ANY", "scope": {"chains": ["ethereum"]}, "actions": [{"type": "ALERT", "message": "Stablecoin allocation below 30%", "severity": "medium"}]}

Request: Warn me if the portfolio is above $50k and one position is more than half of it
{"name": "Concentrated large portfolio", "triggers": [{"metric": "total_usd_value", "operator": ">", "value": 50000}, {"metric": "largest_position_pct", "operator": ">", "value": 50}], "logic": "ALL", "actions": [{"type": "ALERT", "message": "Largest position exceeds 50% of a $50k+ portfolio", "severity": "medium"}]}"#;

/// Builds the full prompt for one request.
///
/// The allowed vocabulary is rendered from the core enums so the prompt can
/// never drift from what validation accepts.
pub fn build_prompt(text: &str) -> String {
    let metrics = Metric::ALL.map(|m| m.as_str()).join(", ");
    let operators = Operator::ALL.map(|op| op.as_str()).join(" ");

    format!(
        "{PREAMBLE}\n\n\
         Allowed metrics: {metrics}\n\
         Allowed operators: {operators}\n\
         Logic: \"ALL\" (every trigger must hold) or \"ANY\" (at least one)\n\
         Actions: {{\"type\": \"ALERT\", \"message\": string, \"severity\": \"low\" | \"medium\" | \"high\"}}\n\
         Optional fields: \"name\" (short title), \"description\", per-trigger \"timeframe\" such as \"24h\", \
         \"scope\": {{\"accounts\": [string], \"chains\": [string]}}\n\
         Values are plain numbers; percentages are expressed as numbers like -5 or 30.\n\n\
         {EXAMPLES}\n\n\
         Request: {}\n",
        text.trim()
    )
}
