//! The pooled `SQLite` adapter.

use super::config::DatabaseConfig;
use super::connection::{
    ConnectionPool, acquire_lock, build_pool, open_connection, read_lock, write_lock,
};
use super::context::Context;
use super::metrics::{DbMetrics, MetricsRecorder, Operation};
use super::persist::{Persistable, build_insert};
use super::sampler::Sampler;
use super::statements::StatementCache;
use crate::storage::migrations::{LEDGER_SQL, MigrationManager};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, InterruptHandle, Row, Transaction, params_from_iter};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Linear backoff step between contended attempts.
const RETRY_STEP: Duration = Duration::from_millis(100);

/// Outcome of [`Database::exec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: usize,
    /// Row id of the most recent successful insert on the connection.
    pub last_insert_id: i64,
}

/// Empties an interrupt slot when dropped.
struct ClearInterrupt(Arc<Mutex<Option<InterruptHandle>>>);

impl Drop for ClearInterrupt {
    fn drop(&mut self) {
        acquire_lock(&self.0).take();
    }
}

/// State shared between the adapter and its background sampler.
pub(crate) struct Shared {
    pool: RwLock<Option<ConnectionPool>>,
    metrics: MetricsRecorder,
    statements: Arc<StatementCache>,
}

impl Shared {
    fn pool(&self) -> Result<ConnectionPool> {
        read_lock(&self.pool).clone().ok_or(Error::Closed)
    }

    /// Publishes the in-use connection gauge. Returns `false` once closed.
    pub(crate) fn sample_pool(&self) -> bool {
        let Ok(pool) = self.pool() else {
            return false;
        };
        let state = pool.state();
        let in_use = state.connections.saturating_sub(state.idle_connections);
        self.metrics.set_connections_in_use(in_use);
        tracing::trace!(
            connections = state.connections,
            idle = state.idle_connections,
            in_use,
            "Sampled connection pool"
        );
        true
    }
}

/// Pooled `SQLite` database adapter.
///
/// Safe to share between tasks (wrap it in an [`Arc`]). Every call runs on
/// the blocking thread pool and honors its [`Context`]: when the context ends
/// while a statement is running, the statement is interrupted and the context
/// error is returned.
///
/// Each pooled connection is a separate engine connection, so `:memory:`
/// data sources are only useful with `max_open_conns = 1`.
pub struct Database {
    shared: Arc<Shared>,
    dsn: String,
    config: DatabaseConfig,
    sampler: Mutex<Option<Sampler>>,
    migrations: MigrationManager,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dsn", &self.dsn)
            .field("config", &self.config)
            .field("closed", &read_lock(&self.shared.pool).is_none())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the database at `dsn`.
    ///
    /// Opens and configures one connection up front, creates the migrations
    /// ledger when `auto_create_tables` is set, then builds the pool. The
    /// sampler starts when `debug` is on and a Tokio runtime is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid configuration, or a
    /// [`Error::Database`] / [`Error::Pool`] error whose operation names the
    /// failed step: `open`, `pragma` or `ledger`.
    pub fn open(dsn: &str, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let effective = config.compose_dsn(dsn);

        {
            let conn = open_connection(&effective, &config)?;
            if config.auto_create_tables {
                conn.execute_batch(LEDGER_SQL)
                    .map_err(|e| Error::database("ledger", e))?;
            }
        }

        let statements = Arc::new(StatementCache::new());
        let pool = build_pool(&effective, &config, Arc::clone(&statements))?;
        let shared = Arc::new(Shared {
            pool: RwLock::new(Some(pool)),
            metrics: MetricsRecorder::new(config.debug),
            statements,
        });

        let sampler = if config.debug {
            Sampler::spawn(Arc::downgrade(&shared), config.sample_interval)
        } else {
            None
        };

        tracing::info!(
            dsn = %effective,
            max_open_conns = config.max_open_conns,
            debug = config.debug,
            "Opened SQLite database"
        );

        Ok(Self {
            shared,
            dsn: effective,
            config,
            sampler: Mutex::new(sampler),
            migrations: MigrationManager::new(),
        })
    }

    /// The composed data-source string.
    #[must_use]
    pub fn effective_dsn(&self) -> &str {
        &self.dsn
    }

    /// The configuration captured at open time.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        read_lock(&self.shared.pool).is_none()
    }

    /// Returns `true` while the background pool sampler is running.
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        acquire_lock(&self.sampler)
            .as_ref()
            .is_some_and(|sampler| !sampler.is_finished())
    }

    /// Runs `f` on a pooled connection on the blocking thread pool.
    async fn run_blocking<T, F>(&self, ctx: &Context, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &Shared) -> Result<T> + Send + 'static,
    {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let pool = self.shared.pool()?;
        let shared = Arc::clone(&self.shared);
        let interrupt: Arc<Mutex<Option<InterruptHandle>>> = Arc::default();
        let slot = Arc::clone(&interrupt);
        let task_ctx = ctx.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|source| Error::Pool {
                operation: operation.to_string(),
                source,
            })?;
            *acquire_lock(&slot) = Some(conn.get_interrupt_handle());
            // Declared after `conn`, so the slot is cleared (also on unwind)
            // before the connection goes back to the pool.
            let _clear = ClearInterrupt(slot);
            if let Some(err) = task_ctx.err() {
                return Err(err);
            }
            f(&mut *conn, &*shared)
        });

        tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
                Err(e) => Err(Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                }),
            },
            err = ctx.done() => {
                if let Some(handle) = acquire_lock(&interrupt).as_ref() {
                    handle.interrupt();
                }
                tracing::debug!(operation, error = %err, "Interrupted in-flight statement");
                Err(err)
            }
        }
    }

    /// Executes a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns the engine error, a pool error, [`Error::Closed`] or the
    /// context error.
    pub async fn exec(
        &self,
        ctx: &Context,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        let sql = sql.into();
        let start = Instant::now();
        let result = self
            .run_blocking(ctx, "exec", move |conn, shared| {
                let mut statement = shared
                    .statements
                    .prepare(conn, &sql)
                    .map_err(|e| Error::database("exec", e))?;
                let rows_affected = statement
                    .execute(params_from_iter(params))
                    .map_err(|e| Error::database("exec", e))?;
                Ok(ExecResult {
                    rows_affected,
                    last_insert_id: conn.last_insert_rowid(),
                })
            })
            .await;
        self.shared
            .metrics
            .record(Operation::Exec, start, result.as_ref().err());
        result
    }

    /// Runs a query and maps every row with `map`.
    ///
    /// The cursor is driven to completion on the pooled connection, so the
    /// connection is back in the pool when this returns.
    ///
    /// # Errors
    ///
    /// Returns the engine error (including errors from `map`), a pool error,
    /// [`Error::Closed`] or the context error.
    pub async fn query<T, F>(
        &self,
        ctx: &Context,
        sql: impl Into<String>,
        params: Vec<Value>,
        map: F,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
    {
        let sql = sql.into();
        let start = Instant::now();
        let result = self
            .run_blocking(ctx, "query", move |conn, shared| {
                let mut statement = shared
                    .statements
                    .prepare(conn, &sql)
                    .map_err(|e| Error::database("query", e))?;
                let rows = statement
                    .query_map(params_from_iter(params), map)
                    .map_err(|e| Error::database("query", e))?;
                let collected = rows
                    .collect::<rusqlite::Result<Vec<T>>>()
                    .map_err(|e| Error::database("query", e))?;
                Ok(collected)
            })
            .await;
        self.shared
            .metrics
            .record(Operation::Query, start, result.as_ref().err());
        result
    }

    /// Runs `attempt` until it succeeds, fails with a non-busy error or
    /// `max_retries` extra attempts are used up.
    ///
    /// Sleeps `i * 100ms` after the zero-based attempt `i` fails with
    /// `SQLITE_BUSY`. A final busy error carries the attempt count in its
    /// operation name.
    async fn retry_busy<T, A, Fut>(
        &self,
        ctx: &Context,
        max_retries: u32,
        operation: &'static str,
        mut attempt_fn: A,
    ) -> Result<T>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            let err = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_retries {
                tracing::warn!(operation, attempts = attempt + 1, "Still busy after retries");
                return Err(match err {
                    Error::Database { source, .. } => Error::Database {
                        operation: format!("{operation} (after {} attempts)", attempt + 1),
                        source,
                    },
                    other => other,
                });
            }

            self.shared.metrics.record_retry();
            tracing::debug!(operation, attempt, max_retries, error = %err, "Database busy, retrying");
            ctx.sleep(RETRY_STEP * attempt).await?;
            attempt += 1;
        }
    }

    /// Runs a query, retrying while the database is busy.
    ///
    /// Makes at most `max_retries + 1` attempts, sleeping `i * 100ms` after
    /// the zero-based attempt `i` fails with `SQLITE_BUSY`. Any other error is
    /// returned at once. If the final attempt is still busy, that error is
    /// returned with the attempt count in its operation name.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, the last busy error, or the
    /// context error if the context ends while waiting.
    pub async fn query_with_retry<T, F>(
        &self,
        ctx: &Context,
        max_retries: u32,
        sql: impl Into<String>,
        params: Vec<Value>,
        map: F,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Clone + Send + 'static,
    {
        let sql = sql.into();
        self.retry_busy(ctx, max_retries, "query", || {
            self.query(ctx, sql.clone(), params.clone(), map.clone())
        })
        .await
    }

    /// Executes a statement, retrying while the database is busy.
    ///
    /// Same attempt bound and backoff as
    /// [`query_with_retry`](Self::query_with_retry). A busy statement has not
    /// been applied, so re-running it is safe.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, the last busy error, or the
    /// context error if the context ends while waiting.
    pub async fn exec_with_retry(
        &self,
        ctx: &Context,
        max_retries: u32,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        let sql = sql.into();
        self.retry_busy(ctx, max_retries, "exec", || {
            self.exec(ctx, sql.clone(), params.clone())
        })
        .await
    }

    /// Runs `body` inside a transaction.
    ///
    /// Commits when `body` returns `Ok`. Rolls back when it returns `Err`; if
    /// the rollback fails too, the error names both failures. If `body`
    /// panics, the transaction is rolled back and the panic resumes in the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns the body's error, [`Error::RollbackFailed`], a begin or commit
    /// failure, or the context error.
    pub async fn with_transaction<T, F>(&self, ctx: &Context, body: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.run_blocking(ctx, "transaction", move |conn, shared| {
            run_transaction(conn, &shared.metrics, body)
        })
        .await
    }

    /// Inserts `record` into `table` and returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when the record has no tagged fields, or any
    /// error from [`exec`](Self::exec).
    pub async fn insert_struct<P: Persistable + ?Sized>(
        &self,
        ctx: &Context,
        table: &str,
        record: &P,
    ) -> Result<i64> {
        let insert = build_insert(table, record)?;
        let result = self.exec(ctx, insert.sql, insert.params).await?;
        Ok(result.last_insert_id)
    }

    /// [`insert_struct`](Self::insert_struct) through
    /// [`exec_with_retry`](Self::exec_with_retry).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when the record has no tagged fields, or any
    /// error from [`exec_with_retry`](Self::exec_with_retry).
    pub async fn insert_struct_with_retry<P: Persistable + ?Sized>(
        &self,
        ctx: &Context,
        max_retries: u32,
        table: &str,
        record: &P,
    ) -> Result<i64> {
        let insert = build_insert(table, record)?;
        let result = self
            .exec_with_retry(ctx, max_retries, insert.sql, insert.params)
            .await?;
        Ok(result.last_insert_id)
    }

    /// Registers a forward migration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for version `0` or a duplicate version.
    pub fn add_migration<F>(&self, version: u32, body: F) -> Result<()>
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.migrations.add(version, body)
    }

    /// Registers a migration, replacing any existing body for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for version `0`.
    pub fn replace_migration<F>(&self, version: u32, body: F) -> Result<()>
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.migrations.replace(version, body)
    }

    /// Applies every pending migration in one transaction.
    ///
    /// Returns the number of migrations applied.
    ///
    /// # Errors
    ///
    /// Returns the first migration error; nothing is applied in that case.
    pub async fn run_migrations(&self, ctx: &Context) -> Result<usize> {
        self.migrations.run(self, ctx).await
    }

    /// Highest applied migration version, taken from the ledger after the
    /// first [`run_migrations`](Self::run_migrations).
    #[must_use]
    pub fn migration_version(&self) -> u32 {
        self.migrations.current_version()
    }

    /// Snapshot of the adapter metrics. All zero unless `debug` is on.
    #[must_use]
    pub fn metrics(&self) -> DbMetrics {
        self.shared.metrics.snapshot()
    }

    /// Number of distinct SQL texts in the statement cache.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.shared.statements.len()
    }

    /// Checks that a connection can be acquired and used.
    ///
    /// # Errors
    ///
    /// Returns the engine, pool, closed or context error.
    pub async fn ping(&self, ctx: &Context) -> Result<()> {
        self.run_blocking(ctx, "ping", |conn, _| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| Error::database("ping", e))
        })
        .await
    }

    /// Stops the sampler, clears the statement cache and drops the pool.
    ///
    /// Connections still checked out are closed when their calls finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the adapter is already closed.
    pub fn close(&self) -> Result<()> {
        if let Some(sampler) = acquire_lock(&self.sampler).take() {
            sampler.stop();
        }
        let pool = write_lock(&self.shared.pool).take().ok_or(Error::Closed)?;
        self.shared.statements.clear();
        drop(pool);
        tracing::info!(dsn = %self.dsn, "Closed SQLite database");
        Ok(())
    }
}

/// Begins, runs and finalizes one transaction on `conn`.
fn run_transaction<T, F>(conn: &mut Connection, metrics: &MetricsRecorder, body: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn
        .transaction()
        .map_err(|e| Error::database("begin", e))?;

    match panic::catch_unwind(AssertUnwindSafe(|| body(&tx))) {
        Ok(Ok(value)) => match tx.commit() {
            Ok(()) => {
                metrics.record_commit();
                Ok(value)
            },
            Err(e) => {
                // A failed COMMIT leaves the transaction open; dropping it
                // rolls back.
                metrics.record_rollback();
                Err(Error::database("commit", e))
            },
        },
        Ok(Err(cause)) => {
            metrics.record_rollback();
            match tx.rollback() {
                Ok(()) => Err(cause),
                Err(rollback) => Err(Error::RollbackFailed {
                    rollback: rollback.to_string(),
                    cause: Box::new(cause),
                }),
            }
        },
        Err(payload) => {
            metrics.record_rollback();
            if let Err(e) = tx.rollback() {
                tracing::error!(error = %e, "Rollback after panic failed");
            }
            panic::resume_unwind(payload)
        },
    }
}
