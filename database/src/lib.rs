//! # Database Layer
//!
//! Persistence for Chainwatch rules, their evaluation history and the alerts
//! they raise. Every backend implements [`RuleStore`]; the in-memory store
//! backs tests and single-process deployments, the PostgreSQL store backs
//! production with transactional alert creation and embedded migrations.

pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::*;
pub use database::*;
pub use error::*;
pub use memory::MemoryStore;
pub use migrations::{MigrationManager, MigrationResult};
pub use postgres::PgStore;
pub use store::RuleStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
