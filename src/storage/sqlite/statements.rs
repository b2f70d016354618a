//! Prepared-statement cache keyed by SQL text.
//!
//! The adapter keeps a registry of every distinct SQL text it has prepared.
//! Compiled statements live in each connection's own cache, whose capacity is
//! kept at least as large as the registry, so no entry is evicted while the
//! adapter is open.

use super::connection::{read_lock, write_lock};
use rusqlite::{CachedStatement, Connection};
use std::collections::HashSet;
use std::sync::RwLock;

/// Capacity the driver uses when nothing larger is needed.
const MIN_CAPACITY: usize = 16;

/// Registry of SQL texts prepared through the adapter.
#[derive(Debug, Default)]
pub struct StatementCache {
    sql: RwLock<HashSet<String>>,
}

impl StatementCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct SQL texts registered.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock(&self.sql).len()
    }

    /// Returns `true` if nothing has been prepared yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-connection capacity needed to hold every registered statement.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.len().max(MIN_CAPACITY)
    }

    /// Forgets every registered statement.
    pub fn clear(&self) {
        write_lock(&self.sql).clear();
    }

    /// Registers `sql` and prepares it through `conn`'s statement cache.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the statement does not compile.
    pub fn prepare<'conn>(
        &self,
        conn: &'conn Connection,
        sql: &str,
    ) -> rusqlite::Result<CachedStatement<'conn>> {
        let known = read_lock(&self.sql).contains(sql);
        if known {
            conn.set_prepared_statement_cache_capacity(self.capacity());
            return conn.prepare_cached(sql);
        }

        conn.set_prepared_statement_cache_capacity(self.capacity() + 1);
        let statement = conn.prepare_cached(sql)?;
        if write_lock(&self.sql).insert(sql.to_string()) {
            tracing::trace!(statements = self.len(), "Registered prepared statement");
        }
        Ok(statement)
    }
}
