//! Storage layer.
//!
//! - [`sqlite`]: the pooled `SQLite` adapter
//! - [`migrations`]: the forward-only migration ledger
//! - [`schema`]: the service's own numbered migrations

// Allow significant_drop_tightening - guards are scoped to the arithmetic they protect.
#![allow(clippy::significant_drop_tightening)]

pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use migrations::{LEDGER_SQL, MigrationFn, MigrationManager};
pub use sqlite::{Context, Database, DatabaseConfig, DbMetrics, ExecResult};
