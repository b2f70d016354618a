//! Forward-only migration ledger.
//!
//! Migrations are numbered closures registered on the adapter and applied in
//! ascending version order inside a single transaction. Every applied version
//! is recorded in the `migrations` table; a failing body rolls back the whole
//! run and leaves both the ledger and the in-memory cursor untouched.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nova::storage::sqlite::{Context, Database, DatabaseConfig};
//!
//! let db = Database::open("nova.db", DatabaseConfig::default())?;
//! db.add_migration(1, |tx| {
//!     tx.execute_batch("CREATE TABLE t (a INTEGER)")?;
//!     Ok(())
//! })?;
//! db.run_migrations(&Context::background()).await?;
//! ```

use crate::storage::sqlite::{Context, Database, acquire_lock};
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::{OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Ledger table definition.
pub const LEDGER_SQL: &str = "CREATE TABLE IF NOT EXISTS migrations(version INTEGER PRIMARY KEY, applied_at DATETIME DEFAULT CURRENT_TIMESTAMP)";

/// Timestamp format written to `applied_at`, matching `CURRENT_TIMESTAMP`.
const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A migration body.
pub type MigrationFn = Arc<dyn Fn(&Transaction<'_>) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    migrations: BTreeMap<u32, MigrationFn>,
    current_version: u32,
}

/// Registry of numbered migrations plus the applied-version cursor.
///
/// The registry has its own mutex, held only while the map or cursor is
/// touched and never across a database call.
#[derive(Default)]
pub struct MigrationManager {
    registry: Mutex<Registry>,
}

impl fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = acquire_lock(&self.registry);
        f.debug_struct("MigrationManager")
            .field("versions", &registry.migrations.keys().collect::<Vec<_>>())
            .field("current_version", &registry.current_version)
            .finish()
    }
}

impl MigrationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` under `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for version `0` or a version already registered.
    pub fn add<F>(&self, version: u32, body: F) -> Result<()>
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        check_version(version)?;
        let mut registry = acquire_lock(&self.registry);
        if registry.migrations.contains_key(&version) {
            return Err(Error::Usage(format!(
                "migration version {version} is already registered"
            )));
        }
        registry.migrations.insert(version, Arc::new(body));
        tracing::debug!(version, "Registered migration");
        Ok(())
    }

    /// Registers `body` under `version`, replacing any previous body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] for version `0`.
    pub fn replace<F>(&self, version: u32, body: F) -> Result<()>
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        check_version(version)?;
        let replaced = acquire_lock(&self.registry)
            .migrations
            .insert(version, Arc::new(body))
            .is_some();
        tracing::debug!(version, replaced, "Registered migration");
        Ok(())
    }

    /// Registered versions in ascending order.
    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        acquire_lock(&self.registry)
            .migrations
            .keys()
            .copied()
            .collect()
    }

    /// Highest applied version: the ledger's, once a run has read it, or the
    /// last version this manager applied.
    #[must_use]
    pub fn current_version(&self) -> u32 {
        acquire_lock(&self.registry).current_version
    }

    /// Applies every registered migration newer than both the cursor and the
    /// ledger, in one transaction on `db`.
    ///
    /// Returns the number of migrations applied. With nothing pending this is
    /// a no-op that does not touch the database.
    ///
    /// # Errors
    ///
    /// Returns the failing body's error (the run is rolled back), or
    /// [`Error::Usage`] when the ledger records a version this registry does
    /// not know.
    pub async fn run(&self, db: &Database, ctx: &Context) -> Result<usize> {
        let (pending, known) = {
            let registry = acquire_lock(&self.registry);
            let pending: Vec<(u32, MigrationFn)> = registry
                .migrations
                .range(registry.current_version.saturating_add(1)..)
                .map(|(version, body)| (*version, Arc::clone(body)))
                .collect();
            let known: Vec<u32> = registry.migrations.keys().copied().collect();
            (pending, known)
        };

        if pending.is_empty() {
            tracing::debug!("No pending migrations");
            return Ok(0);
        }

        let (recorded, applied) = db
            .with_transaction(ctx, move |tx| apply_pending(tx, &pending, &known))
            .await?;

        let mut registry = acquire_lock(&self.registry);
        let reached = applied.last().copied().unwrap_or(0).max(recorded);
        registry.current_version = registry.current_version.max(reached);
        if applied.is_empty() {
            tracing::debug!(
                version = registry.current_version,
                "Ledger already up to date"
            );
        } else {
            tracing::info!(
                applied = applied.len(),
                version = registry.current_version,
                "Applied migrations"
            );
        }
        Ok(applied.len())
    }
}

fn check_version(version: u32) -> Result<()> {
    if version == 0 {
        return Err(Error::Usage(
            "migration versions start at 1".to_string(),
        ));
    }
    Ok(())
}

/// Runs every pending body newer than the ledger and records it.
///
/// Returns the version the ledger held before the run and the versions
/// applied by it.
fn apply_pending(
    tx: &Transaction<'_>,
    pending: &[(u32, MigrationFn)],
    known: &[u32],
) -> Result<(u32, Vec<u32>)> {
    tx.execute_batch(LEDGER_SQL)
        .map_err(|e| Error::database("ledger", e))?;

    let recorded: Option<u32> = tx
        .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
        .optional()
        .map_err(|e| Error::database("ledger", e))?
        .flatten();
    let recorded = recorded.unwrap_or(0);

    if recorded > 0 && !known.contains(&recorded) {
        return Err(Error::Usage(format!(
            "ledger is at unknown migration version {recorded}"
        )));
    }

    let mut applied = Vec::new();
    for (version, body) in pending.iter().filter(|(v, _)| *v > recorded) {
        tracing::debug!(version, "Applying migration");
        body(tx)?;
        tx.execute(
            "INSERT INTO migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, Utc::now().format(APPLIED_AT_FORMAT).to_string()],
        )
        .map_err(|e| Error::database("ledger", e))?;
        applied.push(*version);
    }
    Ok((recorded, applied))
}
