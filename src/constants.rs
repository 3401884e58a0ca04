//! Stable application-wide constants.
//!
//! Values here are structural limits, external API parameters, and default
//! fallbacks for env-var-based configuration. For tuning knobs that benefit
//! from runtime experimentation, see
//! [`PlannerConfig`](crate::config::PlannerConfig) instead.

// --- Server defaults (used when HOST / PORT env vars are absent) ---

/// Default bind address for the HTTP server.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port for the HTTP server.
pub const DEFAULT_PORT: &str = "3000";

// --- Cache defaults ---

/// Default hot plan cache TTL: 24 hours. Overridden by `PLAN_HOT_CACHE_TTL`.
pub const DEFAULT_PLAN_HOT_CACHE_TTL_SECONDS: u64 = 86_400;
/// Default lifetime of a persisted plan: 30 days. Overridden by `PLAN_CACHE_TTL_DAYS`.
pub const DEFAULT_PLAN_CACHE_TTL_DAYS: i64 = 30;
/// Default location lookup cache TTL: 6 hours. Overridden by `LOCATION_CACHE_TTL`.
pub const DEFAULT_LOCATION_CACHE_TTL_SECONDS: u64 = 21_600;
/// Maximum entries for the in-memory plan cache.
pub const DEFAULT_MEMORY_CACHE_MAX_ENTRIES: u64 = 1_000;
/// Maximum entries for the in-memory location cache.
pub const LOCATION_CACHE_MAX_ENTRIES: u64 = 5_000;
/// Maximum entries for the in-memory image cache.
pub const IMAGE_CACHE_MAX_ENTRIES: u64 = 2_000;

// --- Trip request limits ---

/// Longest trip the planner accepts, in days (inclusive of both ends).
pub const MAX_TRIP_DAYS: i64 = 30;
/// Maximum number of intermediate stops.
pub const MAX_STOPS: usize = 8;
/// Maximum number of interests kept from a request.
pub const MAX_INTERESTS: usize = 12;

// --- Location discovery ---

/// Radius (km) within which a geocoded point is matched to a stored location.
pub const GEOCODE_MATCH_RADIUS_KM: f64 = 5.0;
/// Radius (km) used when auto-populating activities for a new location.
pub const DEFAULT_DISCOVERY_POI_RADIUS_KM: f64 = 5.0;
/// Upper bound on places stored per auto-populated location.
pub const MAX_AUTO_POPULATED_PLACES: usize = 40;
/// User agent sent to OSM-operated services, which reject anonymous clients.
pub const USER_AGENT: &str = "travelplan/0.1 (trip planning service)";

// --- Routing ---

/// Mapbox and OSRM both cap a directions request at 25 coordinates.
pub const MAX_DIRECTIONS_WAYPOINTS: usize = 25;
/// Fixed overhead (hours) added to each flight leg for airport transfers.
pub const FLIGHT_OVERHEAD_HOURS: f64 = 2.5;
/// Radius (km) for attaching a known location to an overnight stop.
pub const OVERNIGHT_STOP_MATCH_RADIUS_KM: f64 = 30.0;
/// Buffer (km) added around the route when searching waypoint candidates.
pub const WAYPOINT_BBOX_BUFFER_KM: f64 = 25.0;

// --- Overpass ---

/// Server-side timeout requested in every Overpass query.
pub const OVERPASS_QUERY_TIMEOUT_SECONDS: u64 = 25;
/// Retries for a single Overpass query (3 total attempts).
pub const OVERPASS_RETRY_MAX_ATTEMPTS: usize = 2;
/// Base delay for Overpass retry backoff.
pub const OVERPASS_RETRY_BASE_MS: u64 = 1000;
/// Overpass answers 429 when the per-IP slot quota is exhausted.
pub const OVERPASS_HTTP_TOO_MANY_REQUESTS: u16 = 429;
/// Overpass answers 504 when the server is overloaded.
pub const OVERPASS_HTTP_GATEWAY_TIMEOUT: u16 = 504;
/// Result cap per Overpass query.
pub const OVERPASS_MAX_RESULTS: usize = 150;

// --- AI ---

/// Default OpenAI-compatible endpoint of the hosted model provider.
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default model for standard plans.
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
/// Default model for pro (reasoning) plans.
pub const DEFAULT_GROQ_PRO_MODEL: &str = "openai/gpt-oss-120b";
/// Default fallback model tried when the configured one is unavailable.
pub const DEFAULT_GROQ_FALLBACK_MODELS: &str = "llama-3.1-8b-instant";
/// Per-request timeout for model calls.
pub const AI_REQUEST_TIMEOUT_SECONDS: u64 = 90;
/// Completion budget for standard plans.
pub const AI_MAX_TOKENS_STANDARD: u32 = 6_000;
/// Completion budget for pro plans.
pub const AI_MAX_TOKENS_PRO: u32 = 12_000;
/// Upper bound on retry jitter added to each backoff step.
pub const AI_RETRY_JITTER_MS: u64 = 250;

// --- Images ---

/// Photography subreddits searched for location images.
pub const IMAGE_SUBREDDITS: &[&str] = &[
    "travelphotography",
    "itookapicture",
    "earthporn",
    "cityporn",
    "villageporn",
    "architectureporn",
];
/// Post titles containing any of these are not location photos.
pub const IMAGE_TITLE_EXCLUDE: &[&str] = &["meme", "funny", "joke", "selfie", "my face"];
/// Per-request timeout for image feeds.
pub const IMAGE_REQUEST_TIMEOUT_SECONDS: u64 = 10;
