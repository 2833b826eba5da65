//! Rule compiler crate for Chainwatch
//!
//! Turns a free-form description such as "alert me if daily PnL drops below
//! -5%" into a validated [`RuleDefinition`](chainwatch_core::RuleDefinition).
//! The language model is treated as an opaque text oracle; its answer is only
//! accepted after strict validation, never repaired or guessed at.

pub mod compiler;
pub mod error;
pub mod openrouter;
pub mod oracle;
pub mod prompt;

pub use compiler::{extract_first_json_object, CompiledRule, RuleCompiler, DEFAULT_ORACLE_TIMEOUT};
pub use error::{CompileError, OracleError};
pub use openrouter::{OpenRouterConfig, OpenRouterOracle};
pub use oracle::{StaticOracle, TextOracle};
pub use prompt::build_prompt;
