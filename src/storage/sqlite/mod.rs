//! Pooled `SQLite` adapter.
//!
//! [`Database`] wraps an `r2d2` connection pool and offers:
//!
//! - [`exec`](Database::exec) / [`query`](Database::query): parameterized,
//!   context-scoped, instrumented statements
//! - [`query_with_retry`](Database::query_with_retry) /
//!   [`exec_with_retry`](Database::exec_with_retry): linear backoff while the
//!   database reports `SQLITE_BUSY`
//! - [`with_transaction`](Database::with_transaction): commit on success,
//!   rollback on error or panic
//! - [`insert_struct`](Database::insert_struct): `INSERT` derived from a
//!   [`Persistable`] record
//! - a migration ledger ([`run_migrations`](Database::run_migrations))
//! - debug-gated [`DbMetrics`] and a background pool sampler
//!
//! ## Module Structure
//!
//! - [`config`]: open-time configuration and data-source composition
//! - [`connection`]: pool construction, pragmas, lock helpers
//! - [`context`]: cancellation and deadlines
//! - [`metrics`]: metrics record and exported series
//! - [`persist`]: reflective insert support
//! - [`statements`]: prepared-statement cache registry

mod adapter;
pub mod config;
pub mod connection;
pub mod context;
pub mod metrics;
pub mod persist;
mod sampler;
pub mod statements;

pub use adapter::{Database, ExecResult};
pub use config::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_SAMPLE_INTERVAL, DatabaseConfig};
pub use connection::{
    ConnectionPool, PooledConnection, acquire_lock, configure_connection, read_lock, write_lock,
};
pub use context::Context;
pub use metrics::{DbMetrics, Operation, record_operation_metrics};
pub use persist::{Field, InsertStatement, Persistable, build_insert};
pub use rusqlite::types::Value;
pub use rusqlite::{Row, Transaction};
pub use statements::StatementCache;
