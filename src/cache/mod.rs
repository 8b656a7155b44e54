use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Side cache over Redis. Every operation is best-effort: a connection
/// failure degrades to a miss (or a no-op for writes) and never surfaces to
/// the caller, who is expected to fall back to the store.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
}

impl Cache {
    pub async fn connect(url: &str) -> Self {
        let conn = match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::warn!(error = %e, "redis unreachable, cache disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "invalid redis url, cache disabled");
                None
            }
        };
        Self { conn }
    }

    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "cache get failed");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        let result = match ttl {
            Some(seconds) => conn.set_ex::<_, _, ()>(key, value, seconds).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(key, error = %e, "cache set failed");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        match conn.del::<_, i64>(key).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                tracing::debug!(key, error = %e, "cache delete failed");
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        conn.exists::<_, bool>(key).await.unwrap_or(false)
    }

    /// Remaining TTL in seconds. Negative when the key is missing, has no
    /// expiry, or the cache is unavailable.
    pub async fn ttl(&self, key: &str) -> i64 {
        let Some(mut conn) = self.conn.clone() else {
            return -1;
        };
        conn.ttl::<_, i64>(key).await.unwrap_or(-1)
    }

    pub async fn increment(&self, key: &str, amount: i64) -> Option<i64> {
        let mut conn = self.conn.clone()?;
        match conn.incr::<_, _, i64>(key, amount).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "cache increment failed");
                None
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "cached value is not valid json");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(key, error = %e, "cache json encode failed");
                return false;
            }
        };
        self.set(key, &raw, ttl).await
    }

    /// Delete every key matching `pattern` (glob syntax). Returns the number
    /// of keys removed.
    pub async fn delete_by_prefix(&self, pattern: &str) -> u64 {
        let Some(mut conn) = self.conn.clone() else {
            return 0;
        };
        let keys: Vec<String> = match conn.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::debug!(pattern, error = %e, "cache keys scan failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        conn.del::<_, u64>(keys).await.unwrap_or(0)
    }
}

/// Build a colon-delimited cache key: `cache_key(&["user", "1", "profile"])`
/// yields `cache:user:1:profile`.
pub fn cache_key(parts: &[&str]) -> String {
    let mut key = String::from("cache");
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

pub fn user_cache_key(user_id: &str, aspect: &str) -> String {
    cache_key(&["user", user_id, aspect])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_colon_namespaced() {
        assert_eq!(
            cache_key(&["rbac", "permissions", "42"]),
            "cache:rbac:permissions:42"
        );
        assert_eq!(
            user_cache_key("42", "refresh_token"),
            "cache:user:42:refresh_token"
        );
    }

    #[tokio::test]
    async fn disabled_cache_degrades_to_misses() {
        let cache = Cache::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.get("cache:missing").await, None);
        assert!(!cache.set("cache:key", "value", Some(60)).await);
        assert!(!cache.exists("cache:key").await);
        assert_eq!(cache.increment("cache:counter", 1).await, None);
        assert_eq!(cache.delete_by_prefix("cache:rbac:*").await, 0);
    }
}
