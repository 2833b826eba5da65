//! # Alert Engine
//!
//! Scheduled evaluation of portfolio rules and the lifecycle of the alerts
//! they raise.
//!
//! ## Components
//!
//! - [`Evaluator`]: one tick loads active rules, fetches metrics per user and
//!   scope, evaluates, records and fires
//! - [`Scheduler`]: drives ticks on a fixed interval
//! - [`AlertManager`]: cooldown-aware alert creation, acknowledgment, stats
//! - [`RuleService`]: compile, create and maintain rules
//! - [`MetricsProvider`]: the portfolio metrics seam

pub mod alerts;
pub mod config;
pub mod evaluator;
pub mod metrics_provider;
pub mod rules;
pub mod scheduler;

pub use alerts::AlertManager;
pub use config::{EngineConfig, MetricsProviderConfig};
pub use evaluator::{Evaluator, RulePreview, TickOutcome, TickReport};
pub use metrics_provider::{HttpMetricsProvider, MetricsProvider, StaticMetricsProvider};
pub use rules::RuleService;
pub use scheduler::{Scheduler, SchedulerHandle};
