//! Business logic services.
//!
//! Services sit between the HTTP handlers and the database adapter: they
//! validate records, translate engine errors into client-facing ones and
//! keep the data cache in step with the tables.

mod questions;
mod users;

pub use questions::QuestionService;
pub use users::UserService;

use crate::storage::sqlite::{Persistable, Value};
use crate::{Error, Result};

/// Extra read attempts made while the database reports contention.
pub const READ_RETRIES: u32 = 3;

/// Extra write attempts made while the database reports contention.
pub const WRITE_RETRIES: u32 = 3;

/// Generates a fresh lower-case UUID.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builds `UPDATE <table> SET c2=?,...,cn=? WHERE c1=?` from a record whose
/// first tagged field is its key.
fn build_update<P: Persistable>(table: &str, record: &P) -> Result<(String, Vec<Value>)> {
    let mut columns = record
        .fields()
        .into_iter()
        .filter_map(|field| field.column().map(|column| (column, field.value)));
    let (key_column, key_value) = columns
        .next()
        .ok_or_else(|| Error::Usage("no persistable fields".to_string()))?;

    let (assignments, mut params): (Vec<String>, Vec<Value>) = columns
        .map(|(column, value)| (format!("{column}=?"), value))
        .unzip();
    if assignments.is_empty() {
        return Err(Error::Usage("no columns to update".to_string()));
    }
    params.push(key_value);
    Ok((
        format!(
            "UPDATE {table} SET {} WHERE {key_column}=?",
            assignments.join(",")
        ),
        params,
    ))
}

/// Maps a unique-key collision on insert to [`Error::Conflict`].
fn conflict_on_constraint(err: Error, what: &str) -> Error {
    if err.is_constraint_violation() {
        Error::Conflict(format!("{what} already exists"))
    } else {
        err
    }
}

/// Checks that the id in the path matches the id in the body.
fn check_path_id(path_id: &str, body_id: &str) -> Result<()> {
    if path_id.eq_ignore_ascii_case(body_id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "path id {path_id} does not match body id {body_id}"
        )))
    }
}
