pub mod memory;
pub mod redis;
pub mod signature;

pub use memory::MemoryPlanCache;
pub use redis::RedisPlanCache;
pub use signature::{interest_overlap, TripSignature};

use crate::db::CachedItinerary;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Hot plan cache in front of the database.
///
/// Implementations log their own failures; a broken backend behaves as a miss.
#[async_trait]
pub trait PlanCache: Send + Sync {
    async fn get_plan(&self, key: &str) -> Option<CachedItinerary>;
    async fn put_plan(&self, entry: &CachedItinerary);
    async fn get_stats(&self) -> CacheStats;
    async fn health_check(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub connected: bool,
}

impl CacheStats {
    pub fn from_counts(hits: u64, misses: u64, connected: bool) -> Self {
        let hit_rate = if hits + misses > 0 {
            (hits as f64 / (hits + misses) as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            connected,
        }
    }
}

/// Best reusable plan among stored candidates: highest interest overlap,
/// then closest day count, then most used.
pub fn pick_similar<'a>(
    candidates: &'a [CachedItinerary],
    requested: &TripSignature,
    day_tolerance: i64,
    min_overlap: f64,
) -> Option<&'a CachedItinerary> {
    candidates
        .iter()
        .filter(|c| c.signature.is_similar(requested, day_tolerance, min_overlap))
        .max_by(|a, b| {
            let overlap_a = interest_overlap(&a.signature.interests, &requested.interests);
            let overlap_b = interest_overlap(&b.signature.interests, &requested.interests);
            let gap_a = (a.signature.days - requested.days).abs();
            let gap_b = (b.signature.days - requested.days).abs();
            overlap_a
                .total_cmp(&overlap_b)
                .then_with(|| gap_b.cmp(&gap_a))
                .then_with(|| a.usage_count.cmp(&b.usage_count))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetLevel, Plan};
    use std::collections::HashMap;
    use time::OffsetDateTime;

    fn entry(days: i64, interests: &[&str], usage_count: i32) -> CachedItinerary {
        let interests: Vec<String> = interests.iter().map(|s| s.to_string()).collect();
        let signature =
            TripSignature::new("Paris", "Lyon", &[], days, &interests, BudgetLevel::Moderate);
        CachedItinerary::new(
            signature,
            Plan::new(vec![], String::new(), vec![], HashMap::new(), None),
            Some("m".to_string()),
            OffsetDateTime::now_utc(),
            30,
        )
        .with_usage(usage_count)
    }

    fn requested() -> TripSignature {
        TripSignature::new(
            "Paris",
            "Lyon",
            &[],
            5,
            &["food".to_string(), "art".to_string()],
            BudgetLevel::Moderate,
        )
    }

    #[test]
    fn test_pick_similar_prefers_overlap_then_days_then_usage() {
        let candidates = vec![
            entry(5, &["food"], 10),
            entry(4, &["food", "art"], 0),
            entry(6, &["food", "art"], 3),
        ];

        let best = pick_similar(&candidates, &requested(), 1, 0.5).unwrap();
        assert_eq!(best.signature.days, 6);
        assert_eq!(best.usage_count, 3);
    }

    #[test]
    fn test_pick_similar_prefers_closer_day_count() {
        let candidates = vec![entry(4, &["food", "art"], 9), entry(5, &["food", "art"], 0)];
        let best = pick_similar(&candidates, &requested(), 1, 0.5).unwrap();
        assert_eq!(best.signature.days, 5);
    }

    #[test]
    fn test_pick_similar_none_when_outside_tolerance() {
        let candidates = vec![entry(8, &["food", "art"], 0), entry(5, &["beach"], 0)];
        assert!(pick_similar(&candidates, &requested(), 1, 0.5).is_none());
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats::from_counts(2, 1, true);
        assert!((stats.hit_rate - 66.666).abs() < 1.0);
        assert_eq!(CacheStats::from_counts(0, 0, false).hit_rate, 0.0);
    }
}
