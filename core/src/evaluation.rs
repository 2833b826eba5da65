//! Pure trigger evaluation.

use crate::types::{Logic, Operator, PortfolioMetrics, RuleDefinition};

/// Compares a metric value against a trigger literal.
pub fn evaluate_trigger(actual: f64, operator: Operator, value: f64) -> bool {
    operator.apply(actual, value)
}

/// Folds individual trigger results by the rule's logic mode
pub fn combine(logic: Logic, results: &[bool]) -> bool {
    match logic {
        Logic::All => results.iter().all(|r| *r),
        Logic::Any => results.iter().any(|r| *r),
    }
}

/// Outcome of evaluating a whole definition against one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionOutcome {
    pub triggered: bool,
    /// One entry per trigger, in definition order
    pub trigger_results: Vec<bool>,
}

pub fn evaluate_definition(
    definition: &RuleDefinition,
    metrics: &PortfolioMetrics,
) -> DefinitionOutcome {
    let trigger_results: Vec<bool> = definition
        .triggers()
        .iter()
        .map(|t| evaluate_trigger(t.metric.resolve(metrics), t.operator, t.value))
        .collect();

    DefinitionOutcome {
        triggered: combine(definition.logic(), &trigger_results),
        trigger_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Metric, Severity, Trigger};
    use chrono::Utc;
    use proptest::prelude::*;

    fn metrics(total: f64, pnl: f64, stable: f64, largest: f64) -> PortfolioMetrics {
        PortfolioMetrics {
            total_usd_value: total,
            daily_pnl_pct: pnl,
            stablecoin_allocation_pct: stable,
            largest_position_pct: largest,
            allocations: vec![],
            as_of: Utc::now(),
        }
    }

    fn definition(logic: Logic, triggers: Vec<Trigger>) -> RuleDefinition {
        RuleDefinition::new(
            triggers,
            logic,
            None,
            vec![Action::alert("test", Severity::Low)],
        )
        .unwrap()
    }

    #[test]
    fn test_boundary_comparisons() {
        assert!(evaluate_trigger(-6.0, Operator::LessThan, -5.0));
        assert!(!evaluate_trigger(-5.0, Operator::LessThan, -5.0));
        assert!(evaluate_trigger(-5.0, Operator::LessOrEqual, -5.0));
        assert!(evaluate_trigger(-5.0, Operator::Equal, -5.0));
        assert!(!evaluate_trigger(0.1 + 0.2, Operator::Equal, 0.3));
        assert!(evaluate_trigger(0.1 + 0.2, Operator::NotEqual, 0.3));
    }

    #[test]
    fn test_all_and_any() {
        let snapshot = metrics(10_000.0, -7.0, 20.0, 60.0);
        let triggers = vec![
            Trigger::new(Metric::DailyPnlPct, Operator::LessThan, -5.0),
            Trigger::new(Metric::TotalUsdValue, Operator::GreaterThan, 50_000.0),
        ];

        let all = evaluate_definition(&definition(Logic::All, triggers.clone()), &snapshot);
        assert_eq!(all.trigger_results, vec![true, false]);
        assert!(!all.triggered);

        let any = evaluate_definition(&definition(Logic::Any, triggers), &snapshot);
        assert_eq!(any.trigger_results, vec![true, false]);
        assert!(any.triggered);
    }

    fn operator_strategy() -> impl Strategy<Value = Operator> {
        prop::sample::select(Operator::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_trigger_matches_native_comparison(
            a in -1.0e12f64..1.0e12,
            other in -1.0e12f64..1.0e12,
            same in any::<bool>(),
            op in operator_strategy(),
        ) {
            let b = if same { a } else { other };
            let expected = match op {
                Operator::LessThan => a < b,
                Operator::GreaterThan => a > b,
                Operator::Equal => a == b,
                Operator::LessOrEqual => a <= b,
                Operator::GreaterOrEqual => a >= b,
                Operator::NotEqual => a != b,
            };
            prop_assert_eq!(evaluate_trigger(a, op, b), expected);
        }

        #[test]
        fn prop_combine_is_fold(results in prop::collection::vec(any::<bool>(), 1..8)) {
            prop_assert_eq!(combine(Logic::All, &results), results.iter().fold(true, |acc, r| acc && *r));
            prop_assert_eq!(combine(Logic::Any, &results), results.iter().fold(false, |acc, r| acc || *r));
        }

        #[test]
        fn prop_definition_outcome_follows_logic(
            values in prop::collection::vec(-100.0f64..100.0, 1..6),
            pnl in -100.0f64..100.0,
            use_all in any::<bool>(),
        ) {
            let logic = if use_all { Logic::All } else { Logic::Any };
            let triggers: Vec<Trigger> = values
                .iter()
                .map(|v| Trigger::new(Metric::DailyPnlPct, Operator::LessThan, *v))
                .collect();
            let outcome = evaluate_definition(&definition(logic, triggers), &metrics(1.0, pnl, 0.0, 0.0));
            let expected: Vec<bool> = values.iter().map(|v| pnl < *v).collect();
            prop_assert_eq!(&outcome.trigger_results, &expected);
            prop_assert_eq!(outcome.triggered, combine(logic, &expected));
        }
    }
}
