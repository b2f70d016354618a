//! Data cache in front of the database.
//!
//! [`DataCache`] stores users and questions as JSON under typed keys on a
//! pluggable [`CacheBackend`]:
//!
//! | Key | Value |
//! |-----|-------|
//! | `user:{id}` | the [`User`] |
//! | `username:{name}` | the user id |
//! | `{kind}:{id}` | a question record, e.g. `essay:{id}` |

mod memory;
mod redis;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

use crate::Result;
use crate::config::{CacheConfig, CacheType};
use crate::models::{QuestionRecord, User};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Key/value store used by [`DataCache`].
pub trait CacheBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Returns the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Takes the lock at `key` for `ttl`.
    ///
    /// Returns the token needed to release it, or `None` if the lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    fn lock(&self, key: &str, ttl: Duration) -> Result<Option<String>>;

    /// Releases the lock at `key` if `token` still owns it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`](crate::Error::Conflict) if the lock is gone
    /// or owned by another token.
    fn unlock(&self, key: &str, token: &str) -> Result<()>;

    /// Adds `delta` to the counter at `key` and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or the value at
    /// `key` is not an integer.
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;
}

/// Length of lock tokens.
pub(crate) const LOCK_TOKEN_LEN: usize = 32;

/// Typed JSON cache over a [`CacheBackend`].
#[derive(Clone)]
pub struct DataCache {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }
}

impl DataCache {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Builds the cache selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis backend is selected but unavailable.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match config.cache_type {
            CacheType::Memory => Arc::new(MemoryCache::new()),
            CacheType::Redis => Arc::new(RedisCache::new(&config.redis_addr)?),
        };
        tracing::info!(backend = backend.name(), "Data cache ready");
        Ok(Self::new(backend))
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The underlying backend, for locks and counters.
    #[must_use]
    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.backend
            .get(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(Into::into)
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)
    }

    fn user_key(id: &str) -> String {
        format!("user:{id}")
    }

    fn username_key(name: &str) -> String {
        format!("username:{name}")
    }

    fn question_key<Q: QuestionRecord>(id: &str) -> String {
        format!("{}:{id}", Q::KIND)
    }

    /// Cached user by id.
    ///
    /// # Errors
    ///
    /// Returns a backend or decoding error.
    pub fn user(&self, id: &str) -> Result<Option<User>> {
        self.get_json(&Self::user_key(id))
    }

    /// Cached user id for a username.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn user_id_by_name(&self, username: &str) -> Result<Option<String>> {
        self.backend.get(&Self::username_key(username))
    }

    /// Caches `user` and its username index entry.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn put_user(&self, user: &User) -> Result<()> {
        self.put_json(&Self::user_key(&user.user_id), user)?;
        self.backend
            .set(&Self::username_key(&user.username), &user.user_id)
    }

    /// Drops `user` and its username index entry.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn remove_user(&self, user: &User) -> Result<()> {
        self.backend.delete(&Self::user_key(&user.user_id))?;
        if self.user_id_by_name(&user.username)?.as_deref() == Some(user.user_id.as_str()) {
            self.backend.delete(&Self::username_key(&user.username))?;
        }
        Ok(())
    }

    /// Cached question by id.
    ///
    /// # Errors
    ///
    /// Returns a backend or decoding error.
    pub fn question<Q: QuestionRecord>(&self, id: &str) -> Result<Option<Q>> {
        self.get_json(&Self::question_key::<Q>(id))
    }

    /// Caches a question.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn put_question<Q: QuestionRecord>(&self, question: &Q) -> Result<()> {
        self.put_json(&Self::question_key::<Q>(question.id()), question)
    }

    /// Drops a question.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn remove_question<Q: QuestionRecord>(&self, id: &str) -> Result<bool> {
        self.backend.delete(&Self::question_key::<Q>(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionEssay, QuestionJudgement};

    fn user(id: &str, name: &str) -> User {
        User {
            user_id: id.to_string(),
            username: name.to_string(),
            password: "pw".to_string(),
            phone_number: "1".to_string(),
            ..User::default()
        }
    }

    #[test]
    fn test_user_round_trip_with_name_index() {
        let cache = DataCache::default();
        let alice = user("id-1", "alice");
        cache.put_user(&alice).unwrap();

        assert_eq!(cache.user("id-1").unwrap(), Some(alice.clone()));
        assert_eq!(
            cache.user_id_by_name("alice").unwrap().as_deref(),
            Some("id-1")
        );

        cache.remove_user(&alice).unwrap();
        assert!(cache.user("id-1").unwrap().is_none());
        assert!(cache.user_id_by_name("alice").unwrap().is_none());
    }

    #[test]
    fn test_remove_keeps_name_owned_by_other_user() {
        let cache = DataCache::default();
        let first = user("id-1", "sam");
        let second = user("id-2", "sam");
        cache.put_user(&first).unwrap();
        cache.put_user(&second).unwrap();

        cache.remove_user(&first).unwrap();
        assert_eq!(
            cache.user_id_by_name("sam").unwrap().as_deref(),
            Some("id-2")
        );
    }

    #[test]
    fn test_question_keys_are_per_kind() {
        let cache = DataCache::default();
        let essay = QuestionEssay {
            id: "q".to_string(),
            title: "t".to_string(),
            answer: String::new(),
            standard_answer: "s".to_string(),
        };
        cache.put_question(&essay).unwrap();

        assert_eq!(cache.question::<QuestionEssay>("q").unwrap(), Some(essay));
        assert!(cache.question::<QuestionJudgement>("q").unwrap().is_none());
        assert!(cache.remove_question::<QuestionEssay>("q").unwrap());
    }

    #[test]
    fn test_backend_locks_through_data_cache() {
        let cache = DataCache::default();
        let token = cache
            .backend()
            .lock("warm", Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert!(cache.backend().lock("warm", Duration::from_secs(5)).unwrap().is_none());
        cache.backend().unlock("warm", &token).unwrap();
        assert_eq!(cache.backend().incr_by("hits", 2).unwrap(), 2);
    }

    #[test]
    fn test_default_backend_is_memory() {
        assert_eq!(DataCache::default().backend_name(), "memory");
    }
}
