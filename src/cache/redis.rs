use crate::cache::{CacheStats, PlanCache};
use crate::db::CachedItinerary;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis-backed plan cache. `ConnectionManager` clones share one multiplexed
/// connection, so each call takes its own handle.
pub struct RedisPlanCache {
    connection: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisPlanCache {
    pub async fn new(redis_url: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to connect to Redis: {}", e)))?;

        tracing::info!("Redis cache connection established");

        Ok(RedisPlanCache {
            connection,
            ttl_seconds,
        })
    }
}

#[async_trait]
impl PlanCache for RedisPlanCache {
    async fn get_plan(&self, key: &str) -> Option<CachedItinerary> {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(key).await;

        match result {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(entry) => {
                    tracing::debug!(key, "Cache hit for plan");
                    Some(entry)
                }
                Err(e) => {
                    tracing::warn!(key, "Failed to deserialize cached plan: {}", e);
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key, "Cache miss for plan");
                None
            }
            Err(e) => {
                tracing::warn!(key, "Redis error getting plan: {}", e);
                None
            }
        }
    }

    async fn put_plan(&self, entry: &CachedItinerary) {
        let json = match serde_json::to_string(entry) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize plan for cache: {}", e);
                return;
            }
        };

        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(&entry.cache_key, json, self.ttl_seconds)
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    key = %entry.cache_key,
                    ttl_seconds = self.ttl_seconds,
                    "Cached plan"
                );
            }
            Err(e) => {
                tracing::warn!(key = %entry.cache_key, "Failed to cache plan: {}", e);
            }
        }
    }

    async fn get_stats(&self) -> CacheStats {
        let mut conn = self.connection.clone();
        let info: redis::RedisResult<String> =
            redis::cmd("INFO").arg("stats").query_async(&mut conn).await;

        match info {
            Ok(info_str) => CacheStats::from_counts(
                parse_info_value(&info_str, "keyspace_hits"),
                parse_info_value(&info_str, "keyspace_misses"),
                true,
            ),
            Err(_) => CacheStats::from_counts(0, 0, false),
        }
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn parse_info_value(info: &str, key: &str) -> u64 {
    info.lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|val| val.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_value() {
        let info = "# Stats\r\nkeyspace_hits:42\r\nkeyspace_misses:8\r\n";
        assert_eq!(parse_info_value(info, "keyspace_hits"), 42);
        assert_eq!(parse_info_value(info, "keyspace_misses"), 8);
        assert_eq!(parse_info_value(info, "evicted_keys"), 0);
    }
}
