use crate::cache::TripSignature;
use crate::error::Result;
use crate::models::Plan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A generated plan stored under its trip signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedItinerary {
    pub id: Uuid,
    pub cache_key: String,
    pub signature: TripSignature,
    pub plan: Plan,
    pub model: Option<String>,
    pub usage_count: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl CachedItinerary {
    pub fn new(
        signature: TripSignature,
        plan: Plan,
        model: Option<String>,
        now: OffsetDateTime,
        ttl_days: i64,
    ) -> Self {
        CachedItinerary {
            id: Uuid::new_v4(),
            cache_key: signature.cache_key(),
            signature,
            plan,
            model,
            usage_count: 0,
            last_used_at: None,
            created_at: now,
            expires_at: now + Duration::days(ttl_days),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_usage(mut self, usage_count: i32) -> Self {
        self.usage_count = usage_count;
        self
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait ItineraryRepository: Send + Sync {
    /// Non-expired entry stored under `key`.
    async fn find_by_key(&self, key: &str) -> Result<Option<CachedItinerary>>;

    /// Non-expired entries for the same origin and destination, most used first.
    async fn find_candidates(
        &self,
        origin: &str,
        destination: &str,
        limit: i64,
    ) -> Result<Vec<CachedItinerary>>;

    /// Insert, or replace the plan stored under the same key. Returns the id
    /// of the stored row, which is the existing row's id on conflict.
    async fn save(&self, entry: &CachedItinerary) -> Result<Uuid>;

    async fn record_usage(&self, id: Uuid) -> Result<()>;

    /// Delete expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

pub struct PgItineraryRepository {
    pool: PgPool,
}

impl PgItineraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ITINERARY_COLUMNS: &str = "id, cache_key, signature, plan, model, usage_count, \
                                 last_used_at, created_at, expires_at";

#[derive(sqlx::FromRow)]
struct ItineraryRow {
    id: Uuid,
    cache_key: String,
    signature: Json<TripSignature>,
    plan: Json<Plan>,
    model: Option<String>,
    usage_count: i32,
    last_used_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl From<ItineraryRow> for CachedItinerary {
    fn from(row: ItineraryRow) -> Self {
        CachedItinerary {
            id: row.id,
            cache_key: row.cache_key,
            signature: row.signature.0,
            plan: row.plan.0,
            model: row.model,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl ItineraryRepository for PgItineraryRepository {
    async fn find_by_key(&self, key: &str) -> Result<Option<CachedItinerary>> {
        let sql = format!(
            "SELECT {ITINERARY_COLUMNS}
             FROM cached_itineraries
             WHERE cache_key = $1 AND expires_at > NOW()"
        );
        let row = sqlx::query_as::<_, ItineraryRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CachedItinerary::from))
    }

    async fn find_candidates(
        &self,
        origin: &str,
        destination: &str,
        limit: i64,
    ) -> Result<Vec<CachedItinerary>> {
        let sql = format!(
            "SELECT {ITINERARY_COLUMNS}
             FROM cached_itineraries
             WHERE origin_slug = $1 AND destination_slug = $2 AND expires_at > NOW()
             ORDER BY usage_count DESC, created_at DESC
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, ItineraryRow>(&sql)
            .bind(origin)
            .bind(destination)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CachedItinerary::from).collect())
    }

    async fn save(&self, entry: &CachedItinerary) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO cached_itineraries (id, cache_key, origin_slug, destination_slug,
                                            signature, plan, model, usage_count,
                                            last_used_at, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (cache_key) DO UPDATE
            SET signature = EXCLUDED.signature,
                plan = EXCLUDED.plan,
                model = EXCLUDED.model,
                usage_count = EXCLUDED.usage_count,
                last_used_at = EXCLUDED.last_used_at,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            RETURNING id
            "#,
        )
        .bind(entry.id)
        .bind(&entry.cache_key)
        .bind(&entry.signature.origin)
        .bind(&entry.signature.destination)
        .bind(Json(&entry.signature))
        .bind(Json(&entry.plan))
        .bind(&entry.model)
        .bind(entry.usage_count)
        .bind(entry.last_used_at)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(key = %entry.cache_key, %id, "Persisted plan");
        Ok(id)
    }

    async fn record_usage(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE cached_itineraries
             SET usage_count = usage_count + 1, last_used_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cached_itineraries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
