//! # Chainwatch - Portfolio Rule Engine
//!
//! Chainwatch watches on-chain portfolios against conditions written in plain
//! language and raises alerts when those conditions hold.
//!
//! ## Key Features
//!
//! - **Rule compilation**: free text becomes a strictly validated rule through a
//!   text-generation oracle; nothing is guessed or repaired
//! - **Scheduled evaluation**: every active rule is checked against a fresh
//!   metrics snapshot on a fixed interval, with a bounded worker pool
//! - **Alert lifecycle**: cooldown-aware creation, acknowledgment, deletion and stats
//!
//! ## Architecture
//!
//! The system is organized into modular crates:
//! - `chainwatch-core`: rule model, validation, trigger evaluation, error taxonomy
//! - `chainwatch-database`: rule store trait with in-memory and PostgreSQL backends
//! - `rule-compiler`: natural-language compiler and oracle clients
//! - `alert-engine`: evaluator, scheduler, alert manager and metrics provider seam
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chainwatch::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Chainwatch::builder()
//!         .metrics_provider(Arc::new(StaticMetricsProvider::new()))
//!         .build()?;
//!
//!     let handle = engine.start_scheduler();
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod config;
pub mod core;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{ChainwatchConfig, CompilerConfig};
    pub use crate::core::{Chainwatch, ChainwatchBuilder};
    pub use alert_engine::{
        EngineConfig, HttpMetricsProvider, MetricsProvider, MetricsProviderConfig, RulePreview,
        SchedulerHandle, StaticMetricsProvider, TickOutcome, TickReport,
    };
    pub use chainwatch_core::{
        Alert, AlertStats, ChainwatchError, ChainwatchResult, Rule, RuleDefinition,
        RuleEvaluation, Severity,
    };
    pub use rule_compiler::{OpenRouterOracle, StaticOracle, TextOracle};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub const BUILD_INFO: &str = concat!(
    "Chainwatch v",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_REPOSITORY"),
    ")"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(BUILD_INFO.contains("Chainwatch"));
    }
}
