//! In-process cache backend.

use super::{CacheBackend, LOCK_TOKEN_LEN};
use crate::storage::sqlite::{acquire_lock, read_lock, write_lock};
use crate::utils::random_alphabet_and_number;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Cache held in a process-local map. The default backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
    locks: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A lock without an expiry (its TTL overflowed) never lapses.
fn live(expires: Option<Instant>, now: Instant) -> bool {
    expires.is_none_or(|at| at > now)
}

impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read_lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        write_lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(write_lock(&self.entries).remove(key).is_some())
    }

    fn lock(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let now = Instant::now();
        let mut locks = acquire_lock(&self.locks);
        if locks.get(key).is_some_and(|(_, expires)| live(*expires, now)) {
            return Ok(None);
        }
        let token = random_alphabet_and_number(LOCK_TOKEN_LEN);
        locks.insert(key.to_string(), (token.clone(), now.checked_add(ttl)));
        Ok(Some(token))
    }

    fn unlock(&self, key: &str, token: &str) -> Result<()> {
        let mut locks = acquire_lock(&self.locks);
        match locks.get(key) {
            Some((held, expires)) if held == token && live(*expires, Instant::now()) => {
                locks.remove(key);
                Ok(())
            },
            _ => Err(Error::Conflict(format!("lock {key} is not held by token"))),
        }
    }

    fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = write_lock(&self.entries);
        let current = match entries.get(key) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                Error::InvalidInput(format!("value at {key} is not an integer"))
            })?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| Error::InvalidInput(format!("counter {key} overflowed")))?;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}
