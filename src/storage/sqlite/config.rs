//! Adapter configuration captured at open time.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Interval between pool samples when debug is on.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a caller waits for a pooled connection before giving up.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// `SQLite` adapter configuration.
///
/// Immutable once handed to [`Database::open`](super::Database::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Hard limit on concurrently open connections. `1` serializes all access.
    pub max_open_conns: u32,
    /// Gates metrics collection and the pool sampler.
    pub debug: bool,
    /// Create the migrations ledger while opening.
    pub auto_create_tables: bool,
    /// Use write-ahead logging.
    pub wal_mode: bool,
    /// Page cache size passed to `PRAGMA cache_size`; `0` leaves the default.
    pub cache_size: i64,
    /// Engine busy timeout in milliseconds; `0` fails immediately on contention.
    pub busy_timeout_ms: u64,
    /// Extensions to load, in order, on every new connection.
    pub extensions: Vec<PathBuf>,
    /// Pool sampler period.
    pub sample_interval: Duration,
    /// Maximum wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_open_conns: 1,
            debug: false,
            auto_create_tables: true,
            wal_mode: true,
            cache_size: -2000,
            busy_timeout_ms: 5000,
            extensions: Vec::new(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl DatabaseConfig {
    /// Sets the maximum number of open connections.
    #[must_use]
    pub const fn with_max_open_conns(mut self, max_open_conns: u32) -> Self {
        self.max_open_conns = max_open_conns;
        self
    }

    /// Enables or disables debug metrics.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables ledger creation on open.
    #[must_use]
    pub const fn with_auto_create_tables(mut self, auto_create_tables: bool) -> Self {
        self.auto_create_tables = auto_create_tables;
        self
    }

    /// Enables or disables WAL journaling.
    #[must_use]
    pub const fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    /// Sets the page cache size.
    #[must_use]
    pub const fn with_cache_size(mut self, cache_size: i64) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Sets the busy timeout in milliseconds.
    #[must_use]
    pub const fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Sets the pool sampler period.
    #[must_use]
    pub const fn with_sample_interval(mut self, sample_interval: Duration) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    /// Appends an extension to the preload list.
    #[must_use]
    pub fn with_extension(mut self, path: impl Into<PathBuf>) -> Self {
        self.extensions.push(path.into());
        self
    }

    /// Checks the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when `max_open_conns` is zero or the
    /// sampler interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_conns == 0 {
            return Err(Error::InvalidInput(
                "max_open_conns must be at least 1".to_string(),
            ));
        }
        if self.sample_interval.is_zero() {
            return Err(Error::InvalidInput(
                "sample_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Composes the effective data-source string for `base`.
    ///
    /// Parameters follow the driver convention: `_journal_mode=WAL`,
    /// `_cache_size=<N>` and `_busy_timeout=<ms>`, joined with `&` after a
    /// single `?`. A base that already carries a query string is extended
    /// with `&`.
    #[must_use]
    pub fn compose_dsn(&self, base: &str) -> String {
        let mut params = Vec::with_capacity(3);
        if self.wal_mode {
            params.push("_journal_mode=WAL".to_string());
        }
        if self.cache_size != 0 {
            params.push(format!("_cache_size={}", self.cache_size));
        }
        if self.busy_timeout_ms > 0 {
            params.push(format!("_busy_timeout={}", self.busy_timeout_ms));
        }

        if params.is_empty() {
            return base.to_string();
        }

        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}{}", params.join("&"))
    }
}

/// Strips the query string from a DSN, leaving the path or URI the engine opens.
pub(crate) fn dsn_path(dsn: &str) -> &str {
    if dsn.starts_with("file:") {
        dsn
    } else {
        dsn.split_once('?').map_or(dsn, |(path, _)| path)
    }
}
