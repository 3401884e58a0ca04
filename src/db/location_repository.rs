use crate::error::Result;
use crate::models::{
    Activity, ActivityCategory, BoundingBox, Coordinates, Location, LocationMetadata, Restaurant,
};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Row-to-model conversion with repair of bad stored data
// ---------------------------------------------------------------------------

pub(super) struct RawLocationRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub continent: Option<String>,
    pub description: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub image_url: Option<String>,
    pub population: Option<i64>,
    pub created_at: OffsetDateTime,
}

impl RawLocationRow {
    pub fn into_location(self) -> Location {
        let coordinates = Coordinates::new(self.lat, self.lng).unwrap_or_else(|e| {
            tracing::error!(
                location = %self.name,
                id = %self.id,
                "Invalid coordinates for location: {}. Using fallback.",
                e
            );
            Coordinates { lat: 0.0, lng: 0.0 }
        });

        let population = self.population.filter(|p| {
            if *p < 0 {
                tracing::warn!(location = %self.name, population = p, "Negative population, ignoring");
                false
            } else {
                true
            }
        });

        Location {
            id: self.id,
            name: self.name,
            slug: self.slug,
            country: self.country,
            region: self.region,
            continent: self.continent,
            description: self.description,
            coordinates,
            image_url: self.image_url,
            population,
            created_at: self.created_at,
        }
    }
}

/// Coordinates for optional lat/lng columns; both must be present and valid.
fn optional_coordinates(lat: Option<f64>, lng: Option<f64>, name: &str) -> Option<Coordinates> {
    let (lat, lng) = (lat?, lng?);
    match Coordinates::new(lat, lng) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(place = %name, "Dropping invalid coordinates: {}", e);
            None
        }
    }
}

fn clamp_rating(rating: Option<f32>, name: &str) -> Option<f32> {
    rating.map(|r| {
        if !(0.0..=5.0).contains(&r) {
            tracing::warn!(place = %name, rating = r, "Rating out of range, clamping");
        }
        r.clamp(0.0, 5.0)
    })
}

pub(super) struct RawActivityRow {
    pub id: Uuid,
    pub location_id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub duration_hours: Option<f32>,
    pub cost_estimate: Option<f32>,
    pub rating: Option<f32>,
    pub osm_id: Option<i64>,
}

impl RawActivityRow {
    pub fn into_activity(self) -> Activity {
        let category = self.category.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid activity category '{}' for '{}' (id: {}), defaulting to Other",
                self.category,
                self.name,
                self.id
            );
            ActivityCategory::Other
        });

        let coordinates = optional_coordinates(self.lat, self.lng, &self.name);
        let rating = clamp_rating(self.rating, &self.name);
        let duration_hours = self.duration_hours.filter(|d| *d > 0.0);
        let cost_estimate = self.cost_estimate.filter(|c| *c >= 0.0);

        Activity {
            id: self.id,
            location_id: self.location_id,
            name: self.name,
            category,
            description: self.description,
            coordinates,
            duration_hours,
            cost_estimate,
            rating,
            osm_id: self.osm_id,
        }
    }
}

pub(super) struct RawRestaurantRow {
    pub id: Uuid,
    pub location_id: Uuid,
    pub name: String,
    pub cuisine: Option<String>,
    pub price_level: Option<i16>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub rating: Option<f32>,
    pub osm_id: Option<i64>,
}

impl RawRestaurantRow {
    pub fn into_restaurant(self) -> Restaurant {
        let coordinates = optional_coordinates(self.lat, self.lng, &self.name);
        let rating = clamp_rating(self.rating, &self.name);
        let price_level = self.price_level.map(|p| p.clamp(1, 4));

        Restaurant {
            id: self.id,
            location_id: self.location_id,
            name: self.name,
            cuisine: self.cuisine,
            price_level,
            coordinates,
            rating,
            osm_id: self.osm_id,
        }
    }
}

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Location>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Location>>;

    async fn search_by_name(&self, query: &str, limit: i64) -> Result<Vec<Location>>;

    /// Locations within `radius_km`, nearest first.
    async fn find_nearby(
        &self,
        center: &Coordinates,
        radius_km: f64,
        limit: i64,
    ) -> Result<Vec<Location>>;

    async fn find_in_bbox(&self, bbox: &BoundingBox, limit: i64) -> Result<Vec<Location>>;

    /// Insert, or return the already stored row with the same slug.
    async fn insert(&self, location: &Location) -> Result<Location>;

    async fn update_metadata(&self, id: Uuid, metadata: &LocationMetadata) -> Result<()>;

    async fn update_image(&self, id: Uuid, url: &str) -> Result<()>;

    async fn activities_for(&self, location_id: Uuid, limit: i64) -> Result<Vec<Activity>>;

    async fn restaurants_for(&self, location_id: Uuid, limit: i64) -> Result<Vec<Restaurant>>;

    async fn insert_activities(&self, batch: &[Activity]) -> Result<u64>;

    async fn insert_restaurants(&self, batch: &[Restaurant]) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

pub struct PgLocationRepository {
    pool: sqlx::PgPool,
}

impl PgLocationRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationRepository for PgLocationRepository {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Location>> {
        Ok(super::location_queries::find_location_by_slug(&self.pool, slug).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Location>> {
        Ok(super::location_queries::find_location_by_id(&self.pool, id).await?)
    }

    async fn search_by_name(&self, query: &str, limit: i64) -> Result<Vec<Location>> {
        let name = crate::normalize::primary_name(query);
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let slug = crate::normalize::slugify(&name);
        Ok(
            super::location_queries::search_locations_by_name(&self.pool, &name, &slug, limit)
                .await?,
        )
    }

    async fn find_nearby(
        &self,
        center: &Coordinates,
        radius_km: f64,
        limit: i64,
    ) -> Result<Vec<Location>> {
        Ok(
            super::location_queries::find_locations_nearby(&self.pool, center, radius_km, limit)
                .await?,
        )
    }

    async fn find_in_bbox(&self, bbox: &BoundingBox, limit: i64) -> Result<Vec<Location>> {
        Ok(super::location_queries::find_locations_in_bbox(&self.pool, bbox, limit).await?)
    }

    async fn insert(&self, location: &Location) -> Result<Location> {
        Ok(super::location_queries::upsert_location(&self.pool, location).await?)
    }

    async fn update_metadata(&self, id: Uuid, metadata: &LocationMetadata) -> Result<()> {
        let found =
            super::location_queries::fill_location_metadata(&self.pool, id, metadata).await?;
        if !found {
            tracing::warn!(id = %id, "Metadata update for unknown location");
        }
        Ok(())
    }

    async fn update_image(&self, id: Uuid, url: &str) -> Result<()> {
        Ok(super::location_queries::set_location_image(&self.pool, id, url).await?)
    }

    async fn activities_for(&self, location_id: Uuid, limit: i64) -> Result<Vec<Activity>> {
        Ok(super::location_queries::find_activities(&self.pool, location_id, limit).await?)
    }

    async fn restaurants_for(&self, location_id: Uuid, limit: i64) -> Result<Vec<Restaurant>> {
        Ok(super::location_queries::find_restaurants(&self.pool, location_id, limit).await?)
    }

    async fn insert_activities(&self, batch: &[Activity]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        Ok(super::location_queries::insert_activities(&self.pool, batch).await?)
    }

    async fn insert_restaurants(&self, batch: &[Restaurant]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        Ok(super::location_queries::insert_restaurants(&self.pool, batch).await?)
    }

    async fn count(&self) -> Result<i64> {
        Ok(super::location_queries::count_locations(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_activity(category: &str) -> RawActivityRow {
        RawActivityRow {
            id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            name: "Musée".to_string(),
            category: category.to_string(),
            description: None,
            lat: Some(48.86),
            lng: None,
            duration_hours: Some(-1.0),
            cost_estimate: Some(12.0),
            rating: Some(7.5),
            osm_id: Some(42),
        }
    }

    #[test]
    fn test_activity_row_repairs_bad_data() {
        let activity = raw_activity("spaceport").into_activity();

        assert_eq!(activity.category, ActivityCategory::Other);
        assert!(activity.coordinates.is_none());
        assert!(activity.duration_hours.is_none());
        assert_eq!(activity.cost_estimate, Some(12.0));
        assert_eq!(activity.rating, Some(5.0));
    }

    #[test]
    fn test_activity_row_keeps_good_category() {
        assert_eq!(
            raw_activity("museum").into_activity().category,
            ActivityCategory::Museum
        );
    }

    #[test]
    fn test_location_row_with_invalid_coordinates_falls_back() {
        let location = RawLocationRow {
            id: Uuid::new_v4(),
            name: "Nowhere".to_string(),
            slug: "nowhere".to_string(),
            country: None,
            region: None,
            continent: None,
            description: None,
            lat: 120.0,
            lng: 0.0,
            image_url: None,
            population: Some(-5),
            created_at: OffsetDateTime::now_utc(),
        }
        .into_location();

        assert_eq!(location.coordinates, Coordinates { lat: 0.0, lng: 0.0 });
        assert!(location.population.is_none());
    }

    #[test]
    fn test_restaurant_row_clamps_price_level() {
        let restaurant = RawRestaurantRow {
            id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            name: "Chez Paul".to_string(),
            cuisine: Some("french".to_string()),
            price_level: Some(9),
            lat: Some(45.76),
            lng: Some(4.83),
            rating: None,
            osm_id: None,
        }
        .into_restaurant();

        assert_eq!(restaurant.price_level, Some(4));
        assert!(restaurant.coordinates.is_some());
    }
}
