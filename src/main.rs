use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travelplan::cache::{MemoryPlanCache, PlanCache, RedisPlanCache};
use travelplan::config::Config;
use travelplan::constants::DEFAULT_MEMORY_CACHE_MAX_ENTRIES;
use travelplan::db::{ItineraryRepository, LocationRepository, PgItineraryRepository, PgLocationRepository};
use travelplan::services::directions::{DirectionsClient, DirectionsProvider};
use travelplan::services::geocoding::{GeoNamesClient, Geocoder, NominatimClient};
use travelplan::services::images::{ImageService, PublicImageClient};
use travelplan::services::llm::{GroqClient, ItineraryAi, LlmClient};
use travelplan::services::overpass::{OverpassClient, PlaceSource};
use travelplan::services::{LocationDiscovery, RouteCalculator, TripPlanner, TripPlannerDeps};
use travelplan::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "travelplan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| format!("Failed to load configuration: {}", e))?;

    tracing::info!("Starting travel plan API server");
    tracing::info!(
        model = %config.planner.model,
        pro_model = %config.planner.pro_model,
        fallbacks = ?config.planner.fallback_models,
        "Configuration loaded successfully"
    );

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = travelplan::db::create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize cache: try Redis, fall back to in-memory
    let plan_cache: Arc<dyn PlanCache> = if let Some(ref redis_url) = config.redis_url {
        tracing::info!("Connecting to Redis cache...");
        match RedisPlanCache::new(redis_url, config.plan_hot_cache_ttl).await {
            Ok(redis_cache) => {
                tracing::info!("Redis cache connection established");
                Arc::new(redis_cache)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Redis: {}. Falling back to in-memory cache.",
                    e
                );
                Arc::new(MemoryPlanCache::new(
                    config.plan_hot_cache_ttl,
                    DEFAULT_MEMORY_CACHE_MAX_ENTRIES,
                ))
            }
        }
    } else {
        tracing::info!("Redis URL not configured. Using in-memory cache.");
        Arc::new(MemoryPlanCache::new(
            config.plan_hot_cache_ttl,
            DEFAULT_MEMORY_CACHE_MAX_ENTRIES,
        ))
    };

    // Repositories
    let locations: Arc<dyn LocationRepository> =
        Arc::new(PgLocationRepository::new(db_pool.clone()));
    let itineraries: Arc<dyn ItineraryRepository> =
        Arc::new(PgItineraryRepository::new(db_pool.clone()));

    match itineraries.purge_expired().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Purged expired plans"),
        Err(e) => tracing::warn!("Failed to purge expired plans: {}", e),
    }

    // External services
    let llm: Arc<dyn LlmClient> = Arc::new(GroqClient::new(
        config.groq_api_key.clone(),
        config.groq_base_url.clone(),
    ));
    let ai = Arc::new(ItineraryAi::new(llm, config.planner.clone()));

    let places: Arc<dyn PlaceSource> = Arc::new(OverpassClient::new());

    let mut geocoders: Vec<Arc<dyn Geocoder>> = vec![Arc::new(NominatimClient::new(
        config.nominatim_base_url.clone(),
    ))];
    if let Some(ref username) = config.geonames_username {
        geocoders.push(Arc::new(GeoNamesClient::new(
            config.geonames_base_url.clone(),
            username.clone(),
        )));
    } else {
        tracing::info!("GEONAMES_USERNAME not set. GeoNames geocoding disabled.");
    }

    let directions: Option<Arc<dyn DirectionsProvider>> =
        config.directions_base_url.as_ref().map(|base_url| {
            Arc::new(DirectionsClient::new(
                base_url.clone(),
                config.directions_api_key.clone(),
            )) as Arc<dyn DirectionsProvider>
        });
    if directions.is_none() {
        tracing::info!("DIRECTIONS_BASE_URL not set. Routes use straight-line estimates.");
    }

    let images = config
        .images_enabled
        .then(|| ImageService::new(Arc::new(PublicImageClient::new())));

    let mut discovery = LocationDiscovery::new(
        locations.clone(),
        geocoders,
        places.clone(),
        config.location_cache_ttl,
        config.planner.discovery_poi_radius_km,
    )
    .with_ai(ai.clone());
    if let Some(ref images) = images {
        discovery = discovery.with_images(images.clone());
    }

    let planner = TripPlanner::new(
        TripPlannerDeps {
            discovery: Arc::new(discovery),
            locations: locations.clone(),
            itineraries,
            plan_cache: plan_cache.clone(),
            routes: RouteCalculator::new(directions),
            places,
            ai,
            images,
        },
        config.planner.clone(),
    );

    // Create application state
    let state = Arc::new(AppState {
        planner,
        locations,
        plan_cache,
    });

    // Build router with CORS and tracing
    let app = Router::new()
        .nest("/api/v1", travelplan::routes::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.server_address();
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
