use crate::models::{
    Activity, BoundingBox, Coordinates, Location, LocationMetadata, Restaurant,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::location_repository::{RawActivityRow, RawLocationRow, RawRestaurantRow};

const LOCATION_COLUMNS: &str = "id, name, slug, country, region, continent, description, \
                                lat, lng, image_url, population, created_at";

/// Longitude test against `$3` (min) and `$4` (max); a box crossing the
/// antimeridian has min > max.
const LNG_WITHIN_BOX: &str = "(($3 <= $4 AND lng BETWEEN $3 AND $4) \
                              OR ($3 > $4 AND (lng >= $3 OR lng <= $4)))";

pub async fn find_location_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<Location>, sqlx::Error> {
    let sql = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE slug = $1");
    let row = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.into_raw().into_location()))
}

pub async fn find_location_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Location>, sqlx::Error> {
    let sql = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = $1");
    let row = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.into_raw().into_location()))
}

/// Case-insensitive prefix match on name or slug, most populous first.
pub async fn search_locations_by_name(
    pool: &PgPool,
    name: &str,
    slug: &str,
    limit: i64,
) -> Result<Vec<Location>, sqlx::Error> {
    let sql = format!(
        "SELECT {LOCATION_COLUMNS}
         FROM locations
         WHERE LOWER(name) LIKE $1 ESCAPE '\\' OR slug LIKE $2 ESCAPE '\\'
         ORDER BY (LOWER(name) = LOWER($3)) DESC, population DESC NULLS LAST, name
         LIMIT $4"
    );
    let rows = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(like_prefix(&name.to_lowercase()))
        .bind(like_prefix(slug))
        .bind(name)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| r.into_raw().into_location())
        .collect())
}

pub async fn find_locations_in_bbox(
    pool: &PgPool,
    bbox: &BoundingBox,
    limit: i64,
) -> Result<Vec<Location>, sqlx::Error> {
    let sql = format!(
        "SELECT {LOCATION_COLUMNS}
         FROM locations
         WHERE lat BETWEEN $1 AND $2
         AND {LNG_WITHIN_BOX}
         ORDER BY population DESC NULLS LAST, name
         LIMIT $5"
    );
    let rows = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| r.into_raw().into_location())
        .collect())
}

/// Bounding-box prefilter in SQL, exact Haversine filter and ordering here.
pub async fn find_locations_nearby(
    pool: &PgPool,
    center: &Coordinates,
    radius_km: f64,
    limit: i64,
) -> Result<Vec<Location>, sqlx::Error> {
    let Some(bbox) = BoundingBox::around(std::slice::from_ref(center), radius_km) else {
        return Ok(Vec::new());
    };

    // Nearest first by an equirectangular estimate, so LIMIT never drops a closer row.
    // The box is larger than the circle, so fetch more than `limit`.
    let sql = format!(
        "SELECT {LOCATION_COLUMNS}
         FROM locations
         WHERE lat BETWEEN $1 AND $2
         AND {LNG_WITHIN_BOX}
         ORDER BY power(lat - $6, 2)
                  + power(least(abs(lng - $7), 360 - abs(lng - $7)) * cos(radians($6)), 2)
         LIMIT $5"
    );
    let candidates: Vec<Location> = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lng)
        .bind(bbox.max_lng)
        .bind(limit.saturating_mul(4).max(50))
        .bind(center.lat)
        .bind(center.lng)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| r.into_raw().into_location())
        .collect();

    Ok(nearest_within(candidates, center, radius_km, limit.max(0) as usize))
}

pub(super) fn nearest_within(
    candidates: Vec<Location>,
    center: &Coordinates,
    radius_km: f64,
    limit: usize,
) -> Vec<Location> {
    let mut within: Vec<(f64, Location)> = candidates
        .into_iter()
        .map(|loc| (loc.coordinates.distance_to(center), loc))
        .filter(|(d, _)| *d <= radius_km)
        .collect();
    within.sort_by(|a, b| a.0.total_cmp(&b.0));
    within.into_iter().take(limit).map(|(_, loc)| loc).collect()
}

/// Insert a location, or return the stored row when the slug already exists.
pub async fn upsert_location(pool: &PgPool, location: &Location) -> Result<Location, sqlx::Error> {
    let sql = format!(
        "INSERT INTO locations (id, name, slug, country, region, continent, description,
                                lat, lng, image_url, population, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
         RETURNING {LOCATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, LocationRow>(&sql)
        .bind(location.id)
        .bind(&location.name)
        .bind(&location.slug)
        .bind(&location.country)
        .bind(&location.region)
        .bind(&location.continent)
        .bind(&location.description)
        .bind(location.coordinates.lat)
        .bind(location.coordinates.lng)
        .bind(&location.image_url)
        .bind(location.population)
        .bind(location.created_at)
        .fetch_one(pool)
        .await?;
    Ok(row.into_raw().into_location())
}

/// Fill metadata columns that are still NULL. Returns true if the row exists.
pub async fn fill_location_metadata(
    pool: &PgPool,
    id: Uuid,
    metadata: &LocationMetadata,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE locations
        SET country = COALESCE(country, $2),
            region = COALESCE(region, $3),
            continent = COALESCE(continent, $4),
            description = COALESCE(description, $5)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&metadata.country)
    .bind(&metadata.region)
    .bind(&metadata.continent)
    .bind(&metadata.description)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_location_image(pool: &PgPool, id: Uuid, url: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE locations SET image_url = $2 WHERE id = $1")
        .bind(id)
        .bind(url)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_activities(
    pool: &PgPool,
    location_id: Uuid,
    limit: i64,
) -> Result<Vec<Activity>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"
        SELECT id, location_id, name, category, description, lat, lng,
               duration_hours, cost_estimate, rating, osm_id
        FROM activities
        WHERE location_id = $1
        ORDER BY rating DESC NULLS LAST, name
        LIMIT $2
        "#,
    )
    .bind(location_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| r.into_raw().into_activity())
        .collect())
}

pub async fn find_restaurants(
    pool: &PgPool,
    location_id: Uuid,
    limit: i64,
) -> Result<Vec<Restaurant>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RestaurantRow>(
        r#"
        SELECT id, location_id, name, cuisine, price_level, lat, lng, rating, osm_id
        FROM restaurants
        WHERE location_id = $1
        ORDER BY rating DESC NULLS LAST, name
        LIMIT $2
        "#,
    )
    .bind(location_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| r.into_raw().into_restaurant())
        .collect())
}

/// Batch insert inside one transaction; duplicates on (location_id, osm_id) are skipped.
pub async fn insert_activities(pool: &PgPool, batch: &[Activity]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for activity in batch {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (id, location_id, name, category, description, lat, lng,
                                    duration_hours, cost_estimate, rating, osm_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (location_id, osm_id) DO NOTHING
            "#,
        )
        .bind(activity.id)
        .bind(activity.location_id)
        .bind(&activity.name)
        .bind(activity.category.to_string())
        .bind(&activity.description)
        .bind(activity.coordinates.map(|c| c.lat))
        .bind(activity.coordinates.map(|c| c.lng))
        .bind(activity.duration_hours)
        .bind(activity.cost_estimate)
        .bind(activity.rating)
        .bind(activity.osm_id)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn insert_restaurants(pool: &PgPool, batch: &[Restaurant]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for restaurant in batch {
        let result = sqlx::query(
            r#"
            INSERT INTO restaurants (id, location_id, name, cuisine, price_level, lat, lng,
                                     rating, osm_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (location_id, osm_id) DO NOTHING
            "#,
        )
        .bind(restaurant.id)
        .bind(restaurant.location_id)
        .bind(&restaurant.name)
        .bind(&restaurant.cuisine)
        .bind(restaurant.price_level)
        .bind(restaurant.coordinates.map(|c| c.lat))
        .bind(restaurant.coordinates.map(|c| c.lng))
        .bind(restaurant.rating)
        .bind(restaurant.osm_id)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn count_locations(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// LIKE pattern matching `text` as a literal prefix.
fn like_prefix(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 1);
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: Uuid,
    name: String,
    slug: String,
    country: Option<String>,
    region: Option<String>,
    continent: Option<String>,
    description: Option<String>,
    lat: f64,
    lng: f64,
    image_url: Option<String>,
    population: Option<i64>,
    created_at: OffsetDateTime,
}

impl LocationRow {
    fn into_raw(self) -> RawLocationRow {
        RawLocationRow {
            id: self.id,
            name: self.name,
            slug: self.slug,
            country: self.country,
            region: self.region,
            continent: self.continent,
            description: self.description,
            lat: self.lat,
            lng: self.lng,
            image_url: self.image_url,
            population: self.population,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    location_id: Uuid,
    name: String,
    category: String,
    description: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    duration_hours: Option<f32>,
    cost_estimate: Option<f32>,
    rating: Option<f32>,
    osm_id: Option<i64>,
}

impl ActivityRow {
    fn into_raw(self) -> RawActivityRow {
        RawActivityRow {
            id: self.id,
            location_id: self.location_id,
            name: self.name,
            category: self.category,
            description: self.description,
            lat: self.lat,
            lng: self.lng,
            duration_hours: self.duration_hours,
            cost_estimate: self.cost_estimate,
            rating: self.rating,
            osm_id: self.osm_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RestaurantRow {
    id: Uuid,
    location_id: Uuid,
    name: String,
    cuisine: Option<String>,
    price_level: Option<i16>,
    lat: Option<f64>,
    lng: Option<f64>,
    rating: Option<f32>,
    osm_id: Option<i64>,
}

impl RestaurantRow {
    fn into_raw(self) -> RawRestaurantRow {
        RawRestaurantRow {
            id: self.id,
            location_id: self.location_id,
            name: self.name,
            cuisine: self.cuisine,
            price_level: self.price_level,
            lat: self.lat,
            lng: self.lng,
            rating: self.rating,
            osm_id: self.osm_id,
        }
    }
}
