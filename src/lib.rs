//! # Nova
//!
//! A small JSON service for managing users and questions, backed by an
//! embedded `SQLite` store and an optional data cache.
//!
//! The interesting part lives in [`storage::sqlite`]: a pooled database
//! adapter with contention-aware retry, transactional helpers with rollback
//! on failure or panic, reflective row insertion, a migration ledger and
//! debug-gated latency metrics. The HTTP surface in [`http`] is a thin layer
//! on top of it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nova::storage::sqlite::{Context, Database, DatabaseConfig};
//!
//! let db = Database::open("nova.db", DatabaseConfig::default())?;
//! let ctx = Context::background();
//! db.exec(&ctx, "CREATE TABLE t (a INTEGER)", vec![]).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Extension loading is the only unsafe call site; it opts in locally.
#![deny(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use axum::http::StatusCode;
use thiserror::Error as ThisError;

// Module declarations
pub mod cache;
pub mod config;
pub mod http;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use config::NovaConfig;
pub use models::{ProblemDetails, User, UserPatch};
pub use storage::sqlite::{Context, Database, DatabaseConfig, DbMetrics};

/// `SQLite` primary result code for a busy (contended) database.
pub const SQLITE_BUSY: i32 = 5;

/// Error type for nova operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed request bodies, ids that are not UUIDs |
/// | `NotFound` / `Conflict` | Entity lookups and unique-key collisions |
/// | `Usage` | Adapter misuse: empty inserts, bad migration versions |
/// | `Database` | The engine returned an error (codes preserved) |
/// | `Pool` | No connection could be checked out |
/// | `Closed` | The adapter was used after `close()` |
/// | `Cancelled` / `DeadlineExceeded` | The caller's context ended |
/// | `RollbackFailed` | A transaction body failed and so did the rollback |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The entity already exists or a unique constraint was hit.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation is not allowed on this entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A request precondition did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A request expectation could not be met.
    #[error("expectation failed: {0}")]
    ExpectationFailed(String),

    /// The adapter was used incorrectly.
    ///
    /// Raised when:
    /// - `insert_struct` is called with a record that has no tagged fields
    /// - a migration version is zero or registered twice
    /// - the ledger records a version the registry does not know
    #[error("usage error: {0}")]
    Usage(String),

    /// The database engine returned an error.
    #[error("database operation '{operation}' failed: {source}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// The engine error, with its result code intact.
        #[source]
        source: rusqlite::Error,
    },

    /// A pooled connection could not be acquired.
    #[error("connection pool error during '{operation}': {source}")]
    Pool {
        /// The operation that needed a connection.
        operation: String,
        /// The pool error.
        #[source]
        source: r2d2::Error,
    },

    /// The adapter has been closed.
    #[error("database is closed")]
    Closed,

    /// The caller's context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A transaction body failed and rolling back failed as well.
    #[error("rollback failed: {rollback} (original error: {cause})")]
    RollbackFailed {
        /// The rollback failure.
        rollback: String,
        /// The error returned by the transaction body.
        cause: Box<Self>,
    },

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Wraps an engine error with the name of the operation that produced it.
    pub fn database(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Database {
            operation: operation.into(),
            source,
        }
    }

    /// Returns the extended `SQLite` result code, if this is an engine error.
    ///
    /// The primary code is the low byte (`code & 0xff`).
    #[must_use]
    pub fn sqlite_code(&self) -> Option<i32> {
        match self {
            Self::Database { source, .. } => source.sqlite_error().map(|e| e.extended_code),
            Self::RollbackFailed { cause, .. } => cause.sqlite_code(),
            _ => None,
        }
    }

    /// Returns `true` when the engine reported contention (`SQLITE_BUSY`).
    ///
    /// This is the only class of error the adapter retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database { .. })
            && self
                .sqlite_code()
                .is_some_and(|code| code & 0xff == SQLITE_BUSY)
    }

    /// Returns `true` for unique, primary-key and foreign-key violations.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database {
                source: rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: rusqlite::ErrorCode::ConstraintViolation,
                        ..
                    },
                    _
                ),
                ..
            }
        )
    }

    /// Maps the error onto the HTTP status used in problem responses.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::ExpectationFailed(_) => StatusCode::EXPECTATION_FAILED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(source: rusqlite::Error) -> Self {
        Self::database("sqlite", source)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::OperationFailed {
            operation: "json".to_string(),
            cause: e.to_string(),
        }
    }
}

/// Result type alias for nova operations.
pub type Result<T> = std::result::Result<T, Error>;
