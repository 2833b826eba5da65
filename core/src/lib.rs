//! # Chainwatch Core
//!
//! Domain model shared by every Chainwatch crate: the validated
//! [`RuleDefinition`](types::RuleDefinition), the records produced by the
//! evaluator ([`RuleEvaluation`](types::RuleEvaluation), [`Alert`](types::Alert)),
//! the pure trigger-evaluation functions and the error taxonomy.

#![forbid(unsafe_code)]

pub mod error;
pub mod evaluation;
pub mod types;
pub mod validation;

pub use error::{ChainwatchError, ChainwatchResult, ValidationError};
pub use evaluation::{combine, evaluate_definition, evaluate_trigger, DefinitionOutcome};
pub use types::*;
pub use validation::parse_rule_definition;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
