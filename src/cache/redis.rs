//! Redis cache backend.
//!
//! Besides plain get/set/delete it offers a token lock (`SET NX PX` plus a
//! compare-and-delete release) and atomic counters.

#[cfg(feature = "redis")]
mod implementation {
    use crate::cache::{CacheBackend, LOCK_TOKEN_LEN};
    use crate::utils::random_alphabet_and_number;
    use crate::{Error, Result};
    use redis::{Client, Commands, Connection};
    use std::time::Duration;

    /// Releases a lock only if it still holds the caller's token.
    const UNLOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

    /// Cache stored in a Redis server.
    pub struct RedisCache {
        client: Client,
    }

    fn redis_error(operation: &str, e: &redis::RedisError) -> Error {
        Error::OperationFailed {
            operation: format!("redis_{operation}"),
            cause: e.to_string(),
        }
    }

    impl RedisCache {
        /// Connects to `url` and checks the server answers.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is invalid or the server is unreachable.
        pub fn new(url: &str) -> Result<Self> {
            let client = Client::open(url).map_err(|e| redis_error("connect", &e))?;
            let cache = Self { client };
            let mut conn = cache.get_connection()?;
            let _: String = redis::cmd("PING")
                .query(&mut conn)
                .map_err(|e| redis_error("ping", &e))?;
            tracing::info!(url, "Connected to Redis cache");
            Ok(cache)
        }

        /// Gets a connection from the client.
        fn get_connection(&self) -> Result<Connection> {
            self.client
                .get_connection()
                .map_err(|e| redis_error("get_connection", &e))
        }
    }

    impl CacheBackend for RedisCache {
        fn name(&self) -> &'static str {
            "redis"
        }

        fn get(&self, key: &str) -> Result<Option<String>> {
            let mut conn = self.get_connection()?;
            conn.get(key).map_err(|e| redis_error("get", &e))
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let mut conn = self.get_connection()?;
            conn.set(key, value).map_err(|e| redis_error("set", &e))
        }

        fn delete(&self, key: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let deleted: i64 = conn.del(key).map_err(|e| redis_error("delete", &e))?;
            Ok(deleted > 0)
        }

        fn lock(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
            let mut conn = self.get_connection()?;
            let token = random_alphabet_and_number(LOCK_TOKEN_LEN);
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let acquired: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query(&mut conn)
                .map_err(|e| redis_error("lock", &e))?;
            Ok(acquired.map(|_| token))
        }

        fn unlock(&self, key: &str, token: &str) -> Result<()> {
            let mut conn = self.get_connection()?;
            let released: i64 = redis::Script::new(UNLOCK_SCRIPT)
                .key(key)
                .arg(token)
                .invoke(&mut conn)
                .map_err(|e| redis_error("unlock", &e))?;
            if released == 0 {
                return Err(Error::Conflict(format!("lock {key} is not held by token")));
            }
            Ok(())
        }

        fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
            let mut conn = self.get_connection()?;
            conn.incr(key, delta)
                .map_err(|e| redis_error("incr_by", &e))
        }
    }
}

#[cfg(feature = "redis")]
pub use implementation::RedisCache;

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::cache::CacheBackend;
    use crate::{Error, Result};
    use std::time::Duration;

    /// Stub Redis cache when the feature is not enabled.
    pub struct RedisCache;

    impl RedisCache {
        /// Creates a new Redis cache (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_url: &str) -> Result<Self> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }
    }

    impl CacheBackend for RedisCache {
        fn name(&self) -> &'static str {
            "redis"
        }

        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn lock(&self, _key: &str, _ttl: Duration) -> Result<Option<String>> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn unlock(&self, _key: &str, _token: &str) -> Result<()> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn incr_by(&self, _key: &str, _delta: i64) -> Result<i64> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }
    }
}

#[cfg(not(feature = "redis"))]
pub use stub::RedisCache;

#[cfg(all(test, not(feature = "redis")))]
mod tests {
    use super::*;
    use crate::Error;
    use crate::cache::CacheBackend;

    #[test]
    fn test_stub_reports_missing_feature() {
        assert!(matches!(
            RedisCache::new("redis://127.0.0.1:6379"),
            Err(Error::FeatureNotEnabled(_))
        ));
    }

    #[test]
    fn test_stub_locks_and_counters_report_missing_feature() {
        let cache = RedisCache;
        assert!(matches!(
            cache.lock("k", std::time::Duration::from_secs(1)),
            Err(Error::FeatureNotEnabled(_))
        ));
        assert!(matches!(cache.unlock("k", "t"), Err(Error::FeatureNotEnabled(_))));
        assert!(matches!(cache.incr_by("k", 1), Err(Error::FeatureNotEnabled(_))));
    }
}
