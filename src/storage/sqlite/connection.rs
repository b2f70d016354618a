//! Connection pool setup and per-connection configuration.
//!
//! The pool is an `r2d2` pool over [`SqliteConnectionManager`]. Every new
//! connection passes through [`PragmaCustomizer`], which applies the busy
//! timeout, foreign-key enforcement, journal mode, page cache size and the
//! configured extensions before the connection is handed to any caller.

use super::config::{DatabaseConfig, dsn_path};
use super::statements::StatementCache;
use crate::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (a panic inside a previous critical section),
/// the inner value is recovered and a warning is logged. None of the guarded
/// structures can be left half-updated by a panic.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("SQLite adapter mutex was poisoned, recovering");
        metrics::counter!("db_lock_poison_recovery_total").increment(1);
        poisoned.into_inner()
    })
}

/// Read-lock counterpart of [`acquire_lock`].
pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!("SQLite adapter rwlock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Write-lock counterpart of [`acquire_lock`].
pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!("SQLite adapter rwlock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Per-connection setup run once when the pool establishes a connection.
#[derive(Debug)]
struct PragmaCustomizer {
    config: DatabaseConfig,
    statements: Arc<StatementCache>,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        configure_connection(conn, &self.config)?;
        conn.set_prepared_statement_cache_capacity(self.statements.capacity());
        Ok(())
    }
}

/// Applies the adapter's pragmas to a freshly opened connection.
///
/// # Configuration Applied
///
/// - **busy timeout**: engine-level wait before `SQLITE_BUSY`; `0` disables
///   the driver's built-in default so contention surfaces immediately
/// - **foreign keys**: always on
/// - **WAL**: when `wal_mode` is set
/// - **cache size**: when non-zero
/// - **extensions**: loaded in configured order
///
/// # Errors
///
/// Returns the engine error of the first pragma that fails.
pub fn configure_connection(
    conn: &Connection,
    config: &DatabaseConfig,
) -> std::result::Result<(), rusqlite::Error> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    if config.wal_mode {
        // journal_mode answers with the resulting mode, so it needs the checked variant.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::trace!(journal_mode = %mode, "Journal mode set");
    }
    if config.cache_size != 0 {
        conn.pragma_update(None, "cache_size", config.cache_size)?;
    }
    for extension in &config.extensions {
        load_extension(conn, extension)?;
    }
    Ok(())
}

/// Loads a single run-time extension into `conn`.
#[allow(unsafe_code)]
fn load_extension(conn: &Connection, path: &Path) -> std::result::Result<(), rusqlite::Error> {
    tracing::debug!(extension = %path.display(), "Loading SQLite extension");
    // SAFETY: extension paths come from the operator's configuration, never
    // from request data, and loading is only enabled for the guard's scope.
    unsafe {
        let _guard = rusqlite::LoadExtensionGuard::new(conn)?;
        conn.load_extension(path, None::<&str>)
    }
}

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Opens and configures a single connection outside the pool.
///
/// Used to validate the data source while opening the adapter, so a bad
/// path or pragma fails fast with the engine's own error code.
///
/// # Errors
///
/// Returns [`Error::Database`] naming the failed step (`open` or `pragma`).
pub fn open_connection(dsn: &str, config: &DatabaseConfig) -> Result<Connection> {
    let conn = Connection::open_with_flags(dsn_path(dsn), open_flags())
        .map_err(|e| Error::database("open", e))?;
    configure_connection(&conn, config).map_err(|e| Error::database("pragma", e))?;
    Ok(conn)
}

/// Builds the connection pool for `dsn`.
///
/// The pool is sized to `max_open_conns` and keeps no idle connections of
/// its own accord (`min_idle = 0`); connections are only established when a
/// caller checks one out.
///
/// # Errors
///
/// Returns [`Error::Pool`] if the pool cannot be constructed.
pub fn build_pool(
    dsn: &str,
    config: &DatabaseConfig,
    statements: Arc<StatementCache>,
) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::file(dsn_path(dsn)).with_flags(open_flags());

    Pool::builder()
        .max_size(config.max_open_conns)
        .min_idle(Some(0))
        .connection_timeout(config.acquire_timeout)
        .connection_customizer(Box::new(PragmaCustomizer {
            config: config.clone(),
            statements,
        }))
        .build(manager)
        .map_err(|source| Error::Pool {
            operation: "open".to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    *acquire_lock(&mutex) += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*acquire_lock(&mutex), 10);
    }

    #[test]
    fn test_lock_recovers_from_poison() {
        let lock = Arc::new(RwLock::new(1));
        let poisoner = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            std::panic::panic_any("poison");
        })
        .join();

        assert!(lock.is_poisoned());
        *write_lock(&lock) += 1;
        assert_eq!(*read_lock(&lock), 2);
    }

    #[test]
    fn test_configure_connection() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("pragmas.db")).unwrap();
        let config = DatabaseConfig::default()
            .with_cache_size(-4000)
            .with_busy_timeout_ms(1234);
        configure_connection(&conn, &config).unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let foreign_keys: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let cache_size: i64 = conn
            .pragma_query_value(None, "cache_size", |row| row.get(0))
            .unwrap();
        assert_eq!(cache_size, -4000);

        let busy_timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 1234);
    }

    #[test]
    fn test_zero_busy_timeout_disables_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("busy.db")).unwrap();
        let config = DatabaseConfig::default().with_busy_timeout_ms(0);
        configure_connection(&conn, &config).unwrap();

        let busy_timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 0);
    }

    #[test]
    fn test_build_pool_sizes_to_max_open_conns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let config = DatabaseConfig::default().with_max_open_conns(3);
        let pool = build_pool(
            path.to_str().unwrap(),
            &config,
            Arc::new(StatementCache::new()),
        )
        .unwrap();

        assert_eq!(pool.max_size(), 3);
        assert_eq!(pool.state().connections, 0);

        let conn = pool.get().unwrap();
        let foreign_keys: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_open_connection_names_failed_step() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir/nova.db");
        let err = open_connection(missing.to_str().unwrap(), &DatabaseConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::Database { ref operation, .. } if operation == "open"));

        let config = DatabaseConfig::default().with_extension(dir.path().join("missing_ext"));
        let path = dir.path().join("nova.db");
        let err = open_connection(path.to_str().unwrap(), &config).unwrap_err();
        assert!(matches!(err, Error::Database { ref operation, .. } if operation == "pragma"));
    }

    #[test]
    fn test_missing_extension_fails_connection_setup() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("ext.db")).unwrap();
        let config = DatabaseConfig::default().with_extension(dir.path().join("missing_ext"));
        assert!(configure_connection(&conn, &config).is_err());
    }
}
