//! The plan generation use case.
//!
//! Resolves the trip's places, serves a cached plan when an equivalent or
//! similar trip was planned before, and otherwise gathers route and place
//! context, asks the model for a plan and stores the result.

use crate::cache::{pick_similar, PlanCache, TripSignature};
use crate::config::PlannerConfig;
use crate::constants::WAYPOINT_BBOX_BUFFER_KM;
use crate::db::{CachedItinerary, ItineraryRepository, LocationRepository};
use crate::error::{AppError, Result};
use crate::models::{
    rank_activities, rank_restaurants, ActivityCategory, BoundingBox, Coordinates, Location,
    OvernightStop, Plan, PlanStats, RouteInfo, TripRequest, Waypoint,
};
use crate::services::images::ImageService;
use crate::services::llm::{GenerationMode, ItineraryAi, PlanContext, StayDetails};
use crate::services::location_discovery::{fetch_location_image, LocationDiscovery};
use crate::services::overpass::{OsmPlace, PlaceSource};
use crate::services::route_calculator::RouteCalculator;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::{Date, OffsetDateTime};

const SIMILAR_CANDIDATE_LIMIT: i64 = 20;
const WAYPOINT_CANDIDATE_LIMIT: i64 = 200;
const ROUTE_POI_RADIUS_M: f64 = 10_000.0;
const ROUTE_POI_SAMPLES: usize = 3;
/// Rows loaded per stay before interest ranking narrows them down
const RANKING_POOL_FACTOR: usize = 3;

/// Fallback categories for places along the route when no interest matches
const ROUTE_POI_CATEGORIES: &[ActivityCategory] = &[
    ActivityCategory::Sightseeing,
    ActivityCategory::Nature,
    ActivityCategory::History,
];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Miss,
    Exact,
    Similar,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub plan: Plan,
    pub stats: PlanStats,
    /// Present for freshly generated plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteInfo>,
    pub locations: Vec<Location>,
    /// Location slug -> image URL
    pub images: HashMap<String, String>,
    pub cache_status: CacheStatus,
    pub cache_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Collaborators of [`TripPlanner`].
pub struct TripPlannerDeps {
    pub discovery: Arc<LocationDiscovery>,
    pub locations: Arc<dyn LocationRepository>,
    pub itineraries: Arc<dyn ItineraryRepository>,
    pub plan_cache: Arc<dyn PlanCache>,
    pub routes: RouteCalculator,
    pub places: Arc<dyn PlaceSource>,
    pub ai: Arc<ItineraryAi>,
    pub images: Option<ImageService>,
}

pub struct TripPlanner {
    discovery: Arc<LocationDiscovery>,
    locations: Arc<dyn LocationRepository>,
    itineraries: Arc<dyn ItineraryRepository>,
    plan_cache: Arc<dyn PlanCache>,
    routes: RouteCalculator,
    places: Arc<dyn PlaceSource>,
    ai: Arc<ItineraryAi>,
    images: Option<ImageService>,
    config: PlannerConfig,
}

impl TripPlanner {
    pub fn new(deps: TripPlannerDeps, config: PlannerConfig) -> Self {
        TripPlanner {
            discovery: deps.discovery,
            locations: deps.locations,
            itineraries: deps.itineraries,
            plan_cache: deps.plan_cache,
            routes: deps.routes,
            places: deps.places,
            ai: deps.ai,
            images: deps.images,
            config,
        }
    }

    pub fn discovery(&self) -> &LocationDiscovery {
        &self.discovery
    }

    pub async fn generate(&self, request: &TripRequest) -> Result<PlanResult> {
        let request = request.validate().map_err(AppError::InvalidRequest)?;

        let mut queries = Vec::with_capacity(request.stops.len() + 2);
        queries.push(request.from.clone());
        queries.extend(request.stops.iter().cloned());
        queries.push(request.to.clone());

        let mut trip: Vec<Location> = self
            .discovery
            .resolve_many(&queries)
            .await?
            .into_iter()
            .map(|resolved| resolved.location)
            .collect();

        let origin_slug = trip[0].slug.clone();
        let destination_slug = trip[trip.len() - 1].slug.clone();
        let stop_slugs: Vec<String> = trip[1..trip.len() - 1]
            .iter()
            .map(|l| l.slug.clone())
            .collect();

        let signature =
            TripSignature::from_request(&request, &origin_slug, &stop_slugs, &destination_slug);
        let cache_key = signature.cache_key();

        if let Some((entry, status)) = self.lookup_cached(&signature, &cache_key).await {
            return Ok(self
                .cached_result(entry, status, trip, request.start_date)
                .await);
        }

        tracing::info!(
            cache_key = %cache_key,
            from = %origin_slug,
            to = %destination_slug,
            stops = stop_slugs.len(),
            days = request.day_count(),
            pro = request.pro_mode,
            "Plan cache miss, generating"
        );

        let route = self.routes.calculate(&trip, request.transport_mode).await?;
        let stays: Vec<Location> = trip[1..].to_vec();
        let stay_details = self.load_stay_details(&stays, &request).await;

        let (waypoints, overnight_stops, route_pois) =
            if request.pro_mode || self.config.supplementary_context {
                self.supplementary_context(&route, &trip, &request).await
            } else {
                (Vec::new(), Vec::new(), Vec::new())
            };

        let day_count = u32::try_from(request.day_count())
            .map_err(|_| AppError::InvalidRequest("Invalid day count".to_string()))?;
        let allocation = RouteCalculator::allocate_days(day_count, &stays);

        let context = PlanContext {
            request: request.clone(),
            origin: trip[0].clone(),
            stops: trip[1..trip.len() - 1].to_vec(),
            destination: trip[trip.len() - 1].clone(),
            route: route.clone(),
            allocation,
            stays: stay_details,
            waypoints,
            route_pois,
            overnight_stops,
        };

        let generated = self
            .ai
            .generate(&context, GenerationMode::from_pro_flag(request.pro_mode))
            .await?;

        self.enrich_locations(&mut trip, &generated.plan).await;

        let now = OffsetDateTime::now_utc();
        let mut entry = CachedItinerary::new(
            signature,
            generated.plan,
            Some(generated.model.clone()),
            now,
            self.config.plan_cache_ttl_days,
        );
        match self.itineraries.save(&entry).await {
            // A regenerated key keeps the id of the row it replaced
            Ok(id) => entry.id = id,
            Err(e) => tracing::error!(cache_key = %entry.cache_key, "Failed to persist plan: {}", e),
        }
        self.plan_cache.put_plan(&entry).await;

        let images = self.collect_images(&mut trip).await;

        Ok(PlanResult {
            stats: entry.plan.stats(),
            plan: entry.plan,
            route: Some(route),
            locations: dedup_locations(trip),
            images,
            cache_status: CacheStatus::Miss,
            cache_key: entry.cache_key,
            model: Some(generated.model),
            generated_at: now,
        })
    }

    /// Stored plan by cache key, hot cache first.
    pub async fn find_plan(&self, key: &str) -> Result<Option<CachedItinerary>> {
        let now = OffsetDateTime::now_utc();
        if let Some(entry) = self.plan_cache.get_plan(key).await {
            if !entry.is_expired(now) {
                return Ok(Some(entry));
            }
        }

        let entry = self.itineraries.find_by_key(key).await?;
        if let Some(ref entry) = entry {
            self.plan_cache.put_plan(entry).await;
        }
        Ok(entry)
    }

    /// Hot cache, then the exact database key, then the best similar plan.
    /// Database failures count as a miss.
    async fn lookup_cached(
        &self,
        signature: &TripSignature,
        key: &str,
    ) -> Option<(CachedItinerary, CacheStatus)> {
        let now = OffsetDateTime::now_utc();

        if let Some(entry) = self.plan_cache.get_plan(key).await {
            if !entry.is_expired(now) {
                tracing::debug!(cache_key = %key, "Hot cache hit");
                return Some((entry, CacheStatus::Exact));
            }
        }

        match self.itineraries.find_by_key(key).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                tracing::debug!(cache_key = %key, "Stored plan hit");
                return Some((entry, CacheStatus::Exact));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(cache_key = %key, "Plan lookup failed: {}", e);
                return None;
            }
        }

        let candidates = match self
            .itineraries
            .find_candidates(
                &signature.origin,
                &signature.destination,
                SIMILAR_CANDIDATE_LIMIT,
            )
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(cache_key = %key, "Similar plan lookup failed: {}", e);
                return None;
            }
        };

        let live: Vec<CachedItinerary> = candidates
            .into_iter()
            .filter(|c| !c.is_expired(now))
            .collect();

        pick_similar(
            &live,
            signature,
            self.config.similar_days_tolerance,
            self.config.min_interest_overlap,
        )
        .map(|entry| {
            tracing::debug!(
                cache_key = %key,
                matched = %entry.cache_key,
                "Similar plan hit"
            );
            (entry.clone(), CacheStatus::Similar)
        })
    }

    async fn cached_result(
        &self,
        entry: CachedItinerary,
        status: CacheStatus,
        mut trip: Vec<Location>,
        start_date: Date,
    ) -> PlanResult {
        if let Err(e) = self.itineraries.record_usage(entry.id).await {
            tracing::warn!(cache_key = %entry.cache_key, "Failed to record plan usage: {}", e);
        }

        let usage = entry.usage_count.saturating_add(1);
        let entry = entry.with_usage(usage);
        self.plan_cache.put_plan(&entry).await;

        tracing::info!(
            cache_key = %entry.cache_key,
            status = ?status,
            usage_count = entry.usage_count,
            "Serving cached plan"
        );

        let images = self.collect_images(&mut trip).await;
        PlanResult {
            stats: entry.plan.stats(),
            plan: entry.plan.rebased_to(start_date),
            route: None,
            locations: dedup_locations(trip),
            images,
            cache_status: status,
            cache_key: entry.cache_key,
            model: entry.model,
            generated_at: entry.created_at,
        }
    }

    async fn load_stay_details(&self, stays: &[Location], request: &TripRequest) -> Vec<StayDetails> {
        let activity_limit = self.config.activities_per_location;
        let restaurant_limit = self.config.restaurants_per_location;
        let target_price = request.budget.target_price_level();

        let loads = stays.iter().map(|stay| async move {
            let pool = (activity_limit * RANKING_POOL_FACTOR) as i64;
            let activities = match self.locations.activities_for(stay.id, pool).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(slug = %stay.slug, "Failed to load activities: {}", e);
                    Vec::new()
                }
            };
            let restaurants = match self
                .locations
                .restaurants_for(stay.id, (restaurant_limit * RANKING_POOL_FACTOR) as i64)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(slug = %stay.slug, "Failed to load restaurants: {}", e);
                    Vec::new()
                }
            };

            let mut activities = rank_activities(activities, &request.interests);
            activities.truncate(activity_limit);
            let mut restaurants = rank_restaurants(restaurants, target_price);
            restaurants.truncate(restaurant_limit);

            StayDetails {
                location: stay.clone(),
                activities,
                restaurants,
            }
        });

        join_all(loads).await
    }

    /// Waypoints, overnight stops and places along the route. Each part is
    /// optional: failures only shrink the context.
    async fn supplementary_context(
        &self,
        route: &RouteInfo,
        trip: &[Location],
        request: &TripRequest,
    ) -> (Vec<Waypoint>, Vec<OvernightStop>, Vec<OsmPlace>) {
        let path: Vec<Coordinates> = if route.geometry.len() >= 2 {
            route.geometry.clone()
        } else {
            trip.iter().map(|l| l.coordinates).collect()
        };

        let candidates = match BoundingBox::around(&path, WAYPOINT_BBOX_BUFFER_KM) {
            Some(bbox) => match self
                .locations
                .find_in_bbox(&bbox, WAYPOINT_CANDIDATE_LIMIT)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("Waypoint candidate lookup failed: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let waypoints = RouteCalculator::find_waypoints(
            route,
            trip,
            &candidates,
            self.config.max_detour_km,
            self.config.max_waypoints,
        );
        let overnight_stops =
            RouteCalculator::overnight_stops(route, request.transport_mode, &candidates);
        let route_pois = self.route_pois(&path, &request.interests).await;

        tracing::debug!(
            candidates = candidates.len(),
            waypoints = waypoints.len(),
            overnight_stops = overnight_stops.len(),
            route_pois = route_pois.len(),
            "Gathered supplementary context"
        );

        (waypoints, overnight_stops, route_pois)
    }

    async fn route_pois(&self, path: &[Coordinates], interests: &[String]) -> Vec<OsmPlace> {
        if self.config.max_route_pois == 0 || path.len() < 2 {
            return Vec::new();
        }

        let mut categories: Vec<ActivityCategory> = ActivityCategory::ALL
            .into_iter()
            .filter(|c| c.matches_any(interests))
            .collect();
        if categories.is_empty() {
            categories = ROUTE_POI_CATEGORIES.to_vec();
        }

        let samples = sample_path(path, ROUTE_POI_SAMPLES);
        let fetches = samples.iter().map(|point| {
            self.places
                .fetch_places(point, ROUTE_POI_RADIUS_M, &categories)
        });

        let mut seen = HashSet::new();
        let mut pois = Vec::new();
        for result in join_all(fetches).await {
            match result {
                Ok(places) => {
                    pois.extend(places.into_iter().filter(|p| seen.insert(p.osm_id)));
                }
                Err(e) => tracing::warn!("Route POI lookup failed: {}", e),
            }
        }
        pois.truncate(self.config.max_route_pois);
        pois
    }

    /// Fill missing location fields from the plan's metadata.
    async fn enrich_locations(&self, trip: &mut [Location], plan: &Plan) {
        for location in trip.iter_mut().filter(|l| l.needs_metadata()) {
            let Some(metadata) = plan.metadata_for(&location.name) else {
                continue;
            };
            if !location.apply_metadata(metadata) {
                continue;
            }
            match self.locations.update_metadata(location.id, metadata).await {
                Ok(()) => {
                    tracing::debug!(slug = %location.slug, "Location metadata filled from plan");
                    self.discovery.refresh(location).await;
                }
                Err(e) => tracing::warn!(slug = %location.slug, "Failed to store metadata: {}", e),
            }
        }
    }

    /// Image URLs by slug, fetching missing ones concurrently.
    async fn collect_images(&self, trip: &mut [Location]) -> HashMap<String, String> {
        if let Some(ref images) = self.images {
            let mut seen = HashSet::new();
            let missing: Vec<usize> = trip
                .iter()
                .enumerate()
                .filter(|(_, l)| l.image_url.is_none() && seen.insert(l.slug.clone()))
                .map(|(idx, _)| idx)
                .collect();

            let snapshot: &[Location] = trip;
            let fetched = join_all(
                missing
                    .iter()
                    .map(|&idx| fetch_location_image(images, &snapshot[idx])),
            )
            .await;

            for (idx, url) in missing.into_iter().zip(fetched) {
                let Some(url) = url else { continue };
                if let Err(e) = self.locations.update_image(trip[idx].id, &url).await {
                    tracing::warn!(slug = %trip[idx].slug, "Failed to store location image: {}", e);
                }
                let slug = trip[idx].slug.clone();
                for location in trip.iter_mut().filter(|l| l.slug == slug) {
                    location.image_url = Some(url.clone());
                }
                self.discovery.refresh(&trip[idx]).await;
            }
        }

        trip.iter()
            .filter_map(|l| l.image_url.clone().map(|url| (l.slug.clone(), url)))
            .collect()
    }
}

/// Evenly spaced interior points of a path.
fn sample_path(path: &[Coordinates], count: usize) -> Vec<Coordinates> {
    if path.is_empty() || count == 0 {
        return Vec::new();
    }
    (1..=count)
        .map(|i| path[(path.len() - 1) * i / (count + 1)])
        .collect()
}

/// Trip locations in visit order, each slug once.
fn dedup_locations(trip: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    trip.into_iter()
        .filter(|l| seen.insert(l.slug.clone()))
        .collect()
}
