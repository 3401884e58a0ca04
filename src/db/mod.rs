use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod itinerary_repository;
mod location_queries;
pub mod location_repository;

pub use itinerary_repository::{CachedItinerary, ItineraryRepository, PgItineraryRepository};
pub use location_repository::{LocationRepository, PgLocationRepository};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}
