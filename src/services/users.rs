//! User service.

use super::{
    READ_RETRIES, WRITE_RETRIES, build_update, check_path_id, conflict_on_constraint, new_id,
};
use crate::cache::DataCache;
use crate::models::{User, UserPatch, validate_id};
use crate::storage::sqlite::{Context, Database, Row, Value};
use crate::{Error, Result};
use std::sync::Arc;

const TABLE: &str = "users";

const SELECT_COLUMNS: &str =
    "SELECT user_id, username, password, phone_number, email, address, company FROM users";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        phone_number: row.get(3)?,
        email: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        address: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        company: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("user {id} not found"))
}

/// Users over the database with a read-through cache.
#[derive(Debug, Clone)]
pub struct UserService {
    db: Arc<Database>,
    cache: DataCache,
}

impl UserService {
    /// Creates a service over `db` and `cache`.
    #[must_use]
    pub const fn new(db: Arc<Database>, cache: DataCache) -> Self {
        Self { db, cache }
    }

    /// Generates an id for a new user.
    #[must_use]
    pub fn generate_id(&self) -> String {
        new_id()
    }

    /// Looks up the id of the user called `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no user has that name.
    pub async fn id_by_username(&self, ctx: &Context, username: &str) -> Result<String> {
        if let Some(id) = self.cache.user_id_by_name(username)? {
            return Ok(id);
        }
        let ids = self
            .db
            .query_with_retry(
                ctx,
                READ_RETRIES,
                "SELECT user_id FROM users WHERE username = ? LIMIT 1",
                vec![Value::Text(username.to_string())],
                |row: &Row<'_>| row.get::<_, String>(0),
            )
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("username {username} not found")))
    }

    /// Stores a new user under `path_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed user or mismatched id,
    /// or [`Error::Conflict`] if the id is taken.
    pub async fn create(&self, ctx: &Context, path_id: &str, user: User) -> Result<User> {
        check_path_id(path_id, &user.user_id)?;
        user.validate()?;
        let user = user.normalized();

        self.db
            .insert_struct_with_retry(ctx, WRITE_RETRIES, TABLE, &user)
            .await
            .map_err(|e| conflict_on_constraint(e, &format!("user {}", user.user_id)))?;
        self.cache.put_user(&user)?;
        tracing::info!(user_id = %user.user_id, "Created user");
        Ok(user)
    }

    /// Returns the user with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or
    /// [`Error::NotFound`] if there is no such user.
    pub async fn get(&self, ctx: &Context, id: &str) -> Result<User> {
        validate_id(id)?;
        let id = id.to_lowercase();
        if let Some(user) = self.cache.user(&id)? {
            return Ok(user);
        }

        let user = self
            .db
            .query_with_retry(
                ctx,
                READ_RETRIES,
                format!("{SELECT_COLUMNS} WHERE user_id = ?"),
                vec![Value::Text(id.clone())],
                user_from_row,
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(&id))?;
        self.cache.put_user(&user)?;
        Ok(user)
    }

    /// Replaces the stored user with `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed user or mismatched id,
    /// or [`Error::NotFound`] if there is no such user.
    pub async fn replace(&self, ctx: &Context, path_id: &str, user: User) -> Result<User> {
        check_path_id(path_id, &user.user_id)?;
        user.validate()?;
        let user = user.normalized();
        let previous = self.get(ctx, &user.user_id).await?;
        self.write(ctx, &previous, user).await
    }

    /// Merges the non-empty fields of `patch` into the stored user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a mismatched id or an invalid
    /// result, or [`Error::NotFound`] if there is no such user.
    pub async fn patch(&self, ctx: &Context, path_id: &str, patch: UserPatch) -> Result<User> {
        if let Some(body_id) = patch.user_id.as_deref().filter(|id| !id.is_empty()) {
            check_path_id(path_id, body_id)?;
        }
        let previous = self.get(ctx, path_id).await?;
        let mut merged = previous.clone();
        merged.merge(patch);
        merged.validate()?;
        self.write(ctx, &previous, merged).await
    }

    async fn write(&self, ctx: &Context, previous: &User, user: User) -> Result<User> {
        let (sql, params) = build_update(TABLE, &user)?;
        let result = self
            .db
            .exec_with_retry(ctx, WRITE_RETRIES, sql, params)
            .await?;
        if result.rows_affected == 0 {
            return Err(not_found(&user.user_id));
        }
        self.cache.remove_user(previous)?;
        self.cache.put_user(&user)?;
        tracing::info!(user_id = %user.user_id, "Updated user");
        Ok(user)
    }

    /// Deletes the user with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or
    /// [`Error::NotFound`] if there is no such user.
    pub async fn delete(&self, ctx: &Context, id: &str) -> Result<()> {
        let user = self.get(ctx, id).await?;
        let result = self
            .db
            .exec_with_retry(
                ctx,
                WRITE_RETRIES,
                "DELETE FROM users WHERE user_id = ?",
                vec![Value::Text(user.user_id.clone())],
            )
            .await?;
        self.cache.remove_user(&user)?;
        if result.rows_affected == 0 {
            return Err(not_found(&user.user_id));
        }
        tracing::info!(user_id = %user.user_id, "Deleted user");
        Ok(())
    }

    /// Loads every user into the cache and returns how many were loaded.
    ///
    /// # Errors
    ///
    /// Returns the query or cache error.
    pub async fn warm_cache(&self, ctx: &Context) -> Result<usize> {
        let users = self
            .db
            .query(ctx, SELECT_COLUMNS, Vec::new(), user_from_row)
            .await?;
        for user in &users {
            self.cache.put_user(user)?;
        }
        Ok(users.len())
    }
}
