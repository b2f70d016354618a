//! The service's own schema, expressed as numbered migrations.

use crate::Result;
use crate::storage::sqlite::{Context, Database};

/// Version 1: the users table.
const USERS: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    email TEXT,
    address TEXT,
    company TEXT
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users (username);
";

/// Version 2: one table per question kind. Answer lists are JSON text.
const QUESTIONS: &str = "
CREATE TABLE IF NOT EXISTS single_choice (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    answers TEXT NOT NULL,
    standard_answer TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS multiple_choice (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    answers TEXT NOT NULL,
    standard_answers TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS judgement (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    answer BOOLEAN NOT NULL,
    standard_answer BOOLEAN NOT NULL
);
CREATE TABLE IF NOT EXISTS essay (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    answer TEXT NOT NULL,
    standard_answer TEXT NOT NULL
);
";

/// Latest schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Registers the schema migrations on `db`.
///
/// # Errors
///
/// Returns [`Error::Usage`](crate::Error::Usage) if the versions are already
/// registered.
pub fn register(db: &Database) -> Result<()> {
    db.add_migration(1, |tx| {
        tx.execute_batch(USERS)?;
        Ok(())
    })?;
    db.add_migration(2, |tx| {
        tx.execute_batch(QUESTIONS)?;
        Ok(())
    })
}

/// Registers and applies the schema migrations.
///
/// Returns the number of migrations applied.
///
/// # Errors
///
/// Returns the registration or migration error.
pub async fn migrate(db: &Database, ctx: &Context) -> Result<usize> {
    register(db)?;
    let applied = db.run_migrations(ctx).await?;
    tracing::info!(applied, version = SCHEMA_VERSION, "Schema up to date");
    Ok(applied)
}
