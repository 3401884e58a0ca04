use crate::cache::{CacheStats, PlanCache};
use crate::db::CachedItinerary;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory plan cache backed by moka with TTL and bounded capacity.
pub struct MemoryPlanCache {
    plans: Cache<String, Arc<CachedItinerary>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryPlanCache {
    pub fn new(ttl_seconds: u64, max_capacity: u64) -> Self {
        let plans = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(max_capacity)
            .build();

        MemoryPlanCache {
            plans,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PlanCache for MemoryPlanCache {
    async fn get_plan(&self, key: &str) -> Option<CachedItinerary> {
        match self.plans.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Memory cache hit for plan");
                Some((*entry).clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "Memory cache miss for plan");
                None
            }
        }
    }

    async fn put_plan(&self, entry: &CachedItinerary) {
        self.plans
            .insert(entry.cache_key.clone(), Arc::new(entry.clone()))
            .await;
        tracing::debug!(key = %entry.cache_key, "Memory cached plan");
    }

    async fn get_stats(&self) -> CacheStats {
        CacheStats::from_counts(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            true,
        )
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
