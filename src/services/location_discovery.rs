//! Turns a free-text place name into a stored [`Location`].
//!
//! Lookup goes from cheapest to most expensive: the in-process cache, the
//! database, then external geocoders. A place seen for the first time is
//! created, described by the model, populated with nearby OSM places and
//! given a photo. Only the lookup itself can fail a resolution; every
//! enrichment step is best effort.

use crate::constants::{GEOCODE_MATCH_RADIUS_KM, LOCATION_CACHE_MAX_ENTRIES, MAX_AUTO_POPULATED_PLACES};
use crate::db::LocationRepository;
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityCategory, Location, LocationMetadata, Restaurant};
use crate::normalize::{normalize_query, primary_name, slugify};
use crate::services::geocoding::{GeocodedPlace, Geocoder};
use crate::services::images::ImageService;
use crate::services::llm::ItineraryAi;
use crate::services::overpass::PlaceSource;
use futures::future::join_all;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const IMAGE_FETCH_ATTEMPTS: usize = 2;
const NEARBY_MATCH_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Database,
    GeocodedExisting,
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedLocation {
    pub location: Location,
    pub source: ResolutionSource,
}

pub struct LocationDiscovery {
    repository: Arc<dyn LocationRepository>,
    geocoders: Vec<Arc<dyn Geocoder>>,
    places: Arc<dyn PlaceSource>,
    ai: Option<Arc<ItineraryAi>>,
    images: Option<ImageService>,
    cache: Cache<String, Location>,
    poi_radius_km: f64,
}

impl LocationDiscovery {
    pub fn new(
        repository: Arc<dyn LocationRepository>,
        geocoders: Vec<Arc<dyn Geocoder>>,
        places: Arc<dyn PlaceSource>,
        cache_ttl_seconds: u64,
        poi_radius_km: f64,
    ) -> Self {
        LocationDiscovery {
            repository,
            geocoders,
            places,
            ai: None,
            images: None,
            cache: Cache::builder()
                .max_capacity(LOCATION_CACHE_MAX_ENTRIES)
                .time_to_live(Duration::from_secs(cache_ttl_seconds))
                .build(),
            poi_radius_km,
        }
    }

    /// Describe newly created locations with the model.
    pub fn with_ai(mut self, ai: Arc<ItineraryAi>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Attach a photo to newly created locations.
    pub fn with_images(mut self, images: ImageService) -> Self {
        self.images = Some(images);
        self
    }

    pub async fn resolve(&self, query: &str) -> Result<ResolvedLocation> {
        let query = normalize_query(query);
        let name = primary_name(&query);
        if name.is_empty() {
            return Err(AppError::InvalidRequest(
                "Location query must not be empty".to_string(),
            ));
        }
        let cache_key = slugify(&query);

        if let Some(location) = self.cache.get(&cache_key).await {
            tracing::debug!(query = %query, slug = %location.slug, "Location cache hit");
            return Ok(ResolvedLocation {
                location,
                source: ResolutionSource::Cache,
            });
        }

        let resolved = self.resolve_uncached(&query, &name).await?;
        self.cache
            .insert(cache_key, resolved.location.clone())
            .await;

        tracing::info!(
            query = %query,
            slug = %resolved.location.slug,
            source = ?resolved.source,
            "Location resolved"
        );
        Ok(resolved)
    }

    /// Replace every cached resolution of `location` with its current state.
    /// Call after writing the location back to the repository.
    pub async fn refresh(&self, location: &Location) {
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, cached)| cached.id == location.id)
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.cache.insert(key.as_ref().clone(), location.clone()).await;
        }
    }

    /// Resolve several queries concurrently; results keep the input order.
    pub async fn resolve_many(&self, queries: &[String]) -> Result<Vec<ResolvedLocation>> {
        join_all(queries.iter().map(|q| self.resolve(q)))
            .await
            .into_iter()
            .collect()
    }

    async fn resolve_uncached(&self, query: &str, name: &str) -> Result<ResolvedLocation> {
        if let Some(location) = self.find_stored(query, name).await? {
            return Ok(ResolvedLocation {
                location,
                source: ResolutionSource::Database,
            });
        }

        let Some(place) = self.geocode(query).await else {
            return Err(AppError::NotFound(format!("Unknown location '{}'", query)));
        };

        if let Some(location) = self.find_geocoded_match(&place, name).await? {
            return Ok(ResolvedLocation {
                location,
                source: ResolutionSource::GeocodedExisting,
            });
        }

        let location = self.create(place).await?;
        Ok(ResolvedLocation {
            location,
            source: ResolutionSource::Created,
        })
    }

    async fn find_stored(&self, query: &str, name: &str) -> Result<Option<Location>> {
        let full_slug = slugify(query);
        if let Some(location) = self.repository.find_by_slug(&full_slug).await? {
            return Ok(Some(location));
        }

        let name_slug = slugify(name);
        if name_slug != full_slug {
            if let Some(location) = self.repository.find_by_slug(&name_slug).await? {
                return Ok(Some(location));
            }
        }

        Ok(self
            .repository
            .search_by_name(query, 1)
            .await?
            .into_iter()
            .next())
    }

    /// First geocoder answer wins; failures fall through to the next geocoder.
    async fn geocode(&self, query: &str) -> Option<GeocodedPlace> {
        for geocoder in &self.geocoders {
            match geocoder.geocode(query).await {
                Ok(Some(place)) => {
                    tracing::debug!(
                        geocoder = geocoder.name(),
                        query,
                        name = %place.name,
                        "Geocoded location"
                    );
                    return Some(place);
                }
                Ok(None) => {
                    tracing::debug!(geocoder = geocoder.name(), query, "Geocoder found nothing");
                }
                Err(e) => {
                    tracing::warn!(geocoder = geocoder.name(), query, "Geocoder failed: {}", e);
                }
            }
        }
        None
    }

    async fn find_geocoded_match(
        &self,
        place: &GeocodedPlace,
        query_name: &str,
    ) -> Result<Option<Location>> {
        let nearby = self
            .repository
            .find_nearby(&place.coordinates, GEOCODE_MATCH_RADIUS_KM, NEARBY_MATCH_LIMIT)
            .await?;

        let place_slug = slugify(&place.name);
        let query_slug = slugify(query_name);

        Ok(nearby.into_iter().find(|location| {
            location.slug == place_slug
                || location.slug == query_slug
                || location.name.eq_ignore_ascii_case(&place.name)
        }))
    }

    async fn create(&self, place: GeocodedPlace) -> Result<Location> {
        let mut location = Location::new(place.name.clone(), place.coordinates);
        location.country = place.country.clone();
        location.region = place.region.clone();
        location.continent = place.continent.clone();
        location.population = place.population;

        if location.needs_metadata() || location.description.is_none() {
            let country_hint = location.country.as_deref().or(place.country_code.as_deref());
            if let Some(metadata) = self.describe(&location, country_hint).await {
                location.apply_metadata(&metadata);
            }
        }

        let mut stored = self.repository.insert(&location).await?;
        tracing::info!(
            id = %stored.id,
            slug = %stored.slug,
            country = ?stored.country,
            "Created location"
        );

        if stored.id == location.id {
            self.populate_places(&stored).await;
            if let Some(url) = self.attach_image(&stored).await {
                stored.image_url = Some(url);
            }
        }

        Ok(stored)
    }

    async fn describe(
        &self,
        location: &Location,
        country_hint: Option<&str>,
    ) -> Option<LocationMetadata> {
        let ai = self.ai.as_ref()?;
        match ai.enrich_location(&location.name, country_hint).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(location = %location.name, "Location enrichment failed: {}", e);
                None
            }
        }
    }

    /// Store activities and restaurants found around a new location.
    async fn populate_places(&self, location: &Location) {
        let places = match self
            .places
            .fetch_places(
                &location.coordinates,
                self.poi_radius_km * 1000.0,
                &ActivityCategory::ALL,
            )
            .await
        {
            Ok(places) => places,
            Err(e) => {
                tracing::warn!(slug = %location.slug, "Auto-populate failed: {}", e);
                return;
            }
        };

        let mut activities: Vec<Activity> = Vec::new();
        let mut restaurants: Vec<Restaurant> = Vec::new();
        for place in places.into_iter().take(MAX_AUTO_POPULATED_PLACES) {
            match place.clone().into_activity(location.id) {
                Some(activity) => activities.push(activity),
                None => restaurants.extend(place.into_restaurant(location.id)),
            }
        }

        let inserted_activities = match self.repository.insert_activities(&activities).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(slug = %location.slug, "Failed to store activities: {}", e);
                0
            }
        };
        let inserted_restaurants = match self.repository.insert_restaurants(&restaurants).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(slug = %location.slug, "Failed to store restaurants: {}", e);
                0
            }
        };

        tracing::info!(
            slug = %location.slug,
            activities = inserted_activities,
            restaurants = inserted_restaurants,
            "Auto-populated location"
        );
    }

    async fn attach_image(&self, location: &Location) -> Option<String> {
        let images = self.images.as_ref()?;
        let url = fetch_location_image(images, location).await?;

        if let Err(e) = self.repository.update_image(location.id, &url).await {
            tracing::warn!(slug = %location.slug, "Failed to store location image: {}", e);
        }
        Some(url)
    }
}

/// Photo URL for a location, searched as "Name Country".
pub async fn fetch_location_image(images: &ImageService, location: &Location) -> Option<String> {
    let query = match location.country.as_deref() {
        Some(country) => format!("{} {}", location.name, country),
        None => location.name.clone(),
    };
    images
        .fetch_with_retry(&query, IMAGE_FETCH_ATTEMPTS)
        .await
        .map(|image| image.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_source_serialization() {
        assert_eq!(
            serde_json::to_value(ResolutionSource::GeocodedExisting).unwrap(),
            "geocoded_existing"
        );
        assert_eq!(serde_json::to_value(ResolutionSource::Cache).unwrap(), "cache");
    }
}
