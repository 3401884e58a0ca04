use crate::constants::*;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub groq_api_key: String,
    pub groq_base_url: String,
    /// Base URL of a Mapbox/OSRM compatible directions API. Routing falls back
    /// to Haversine estimates when unset.
    pub directions_base_url: Option<String>,
    pub directions_api_key: Option<String>,
    pub nominatim_base_url: String,
    /// GeoNames requires a registered username; the geocoder is skipped without one.
    pub geonames_username: Option<String>,
    pub geonames_base_url: String,
    pub images_enabled: bool,
    pub plan_hot_cache_ttl: u64,
    pub location_cache_ttl: u64,
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Model used for standard plans
    pub model: String,

    /// Model used for pro (reasoning) plans
    pub pro_model: String,

    /// Models tried in order when the configured one is blocked or invalid
    pub fallback_models: Vec<String>,

    /// Attempts per model before moving on
    pub ai_max_retries: usize,

    /// First backoff step (ms); doubles on every retry
    pub ai_retry_base_ms: u64,

    /// Prompt size bound for standard plans (characters)
    pub max_prompt_chars_standard: usize,

    /// Prompt size bound for pro plans (characters)
    pub max_prompt_chars_pro: usize,

    /// Plans whose day count differs by at most this much are "similar"
    pub similar_days_tolerance: i64,

    /// Minimum interest overlap (0.0-1.0) for a similar cache hit
    pub min_interest_overlap: f64,

    /// Lifetime of a persisted plan
    pub plan_cache_ttl_days: i64,

    /// Activities passed to the model per stay location
    pub activities_per_location: usize,

    /// Restaurants passed to the model per stay location
    pub restaurants_per_location: usize,

    /// Maximum detour (km) for a waypoint candidate
    pub max_detour_km: f64,

    /// Waypoint candidates passed to the model
    pub max_waypoints: usize,

    /// Route POIs passed to the model
    pub max_route_pois: usize,

    /// Gather waypoints, overnight stops and route POIs for standard plans too
    pub supplementary_context: bool,

    /// Radius (km) used when auto-populating a newly created location
    pub discovery_poi_radius_km: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GROQ_MODEL.to_string(),
            pro_model: DEFAULT_GROQ_PRO_MODEL.to_string(),
            fallback_models: parse_model_list(DEFAULT_GROQ_FALLBACK_MODELS),
            ai_max_retries: 3,
            ai_retry_base_ms: 1_000,
            max_prompt_chars_standard: 12_000,
            max_prompt_chars_pro: 24_000,
            similar_days_tolerance: 1,
            min_interest_overlap: 0.5,
            plan_cache_ttl_days: DEFAULT_PLAN_CACHE_TTL_DAYS,
            activities_per_location: 12,
            restaurants_per_location: 6,
            max_detour_km: 60.0,
            max_waypoints: 5,
            max_route_pois: 10,
            supplementary_context: false,
            discovery_poi_radius_km: DEFAULT_DISCOVERY_POI_RADIUS_KM,
        }
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("Invalid boolean value: {}", other)),
    }
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let config = Self {
            model: env::var("GROQ_MODEL").unwrap_or(defaults.model),

            pro_model: env::var("GROQ_PRO_MODEL").unwrap_or(defaults.pro_model),

            fallback_models: env::var("GROQ_FALLBACK_MODELS")
                .map(|raw| parse_model_list(&raw))
                .unwrap_or(defaults.fallback_models),

            ai_max_retries: env::var("AI_MAX_RETRIES")
                .unwrap_or_else(|_| defaults.ai_max_retries.to_string())
                .parse()
                .map_err(|_| "Invalid AI_MAX_RETRIES")?,

            ai_retry_base_ms: env::var("AI_RETRY_BASE_MS")
                .unwrap_or_else(|_| defaults.ai_retry_base_ms.to_string())
                .parse()
                .map_err(|_| "Invalid AI_RETRY_BASE_MS")?,

            max_prompt_chars_standard: env::var("MAX_PROMPT_CHARS")
                .unwrap_or_else(|_| defaults.max_prompt_chars_standard.to_string())
                .parse()
                .map_err(|_| "Invalid MAX_PROMPT_CHARS")?,

            max_prompt_chars_pro: env::var("MAX_PROMPT_CHARS_PRO")
                .unwrap_or_else(|_| defaults.max_prompt_chars_pro.to_string())
                .parse()
                .map_err(|_| "Invalid MAX_PROMPT_CHARS_PRO")?,

            similar_days_tolerance: env::var("SIMILAR_DAYS_TOLERANCE")
                .unwrap_or_else(|_| defaults.similar_days_tolerance.to_string())
                .parse()
                .map_err(|_| "Invalid SIMILAR_DAYS_TOLERANCE")?,

            min_interest_overlap: env::var("MIN_INTEREST_OVERLAP")
                .unwrap_or_else(|_| defaults.min_interest_overlap.to_string())
                .parse()
                .map_err(|_| "Invalid MIN_INTEREST_OVERLAP")?,

            plan_cache_ttl_days: env::var("PLAN_CACHE_TTL_DAYS")
                .unwrap_or_else(|_| defaults.plan_cache_ttl_days.to_string())
                .parse()
                .map_err(|_| "Invalid PLAN_CACHE_TTL_DAYS")?,

            activities_per_location: env::var("ACTIVITIES_PER_LOCATION")
                .unwrap_or_else(|_| defaults.activities_per_location.to_string())
                .parse()
                .map_err(|_| "Invalid ACTIVITIES_PER_LOCATION")?,

            restaurants_per_location: env::var("RESTAURANTS_PER_LOCATION")
                .unwrap_or_else(|_| defaults.restaurants_per_location.to_string())
                .parse()
                .map_err(|_| "Invalid RESTAURANTS_PER_LOCATION")?,

            max_detour_km: env::var("MAX_DETOUR_KM")
                .unwrap_or_else(|_| defaults.max_detour_km.to_string())
                .parse()
                .map_err(|_| "Invalid MAX_DETOUR_KM")?,

            max_waypoints: env::var("MAX_WAYPOINTS")
                .unwrap_or_else(|_| defaults.max_waypoints.to_string())
                .parse()
                .map_err(|_| "Invalid MAX_WAYPOINTS")?,

            max_route_pois: env::var("MAX_ROUTE_POIS")
                .unwrap_or_else(|_| defaults.max_route_pois.to_string())
                .parse()
                .map_err(|_| "Invalid MAX_ROUTE_POIS")?,

            supplementary_context: match env::var("SUPPLEMENTARY_CONTEXT") {
                Ok(raw) => parse_bool(&raw).map_err(|_| "Invalid SUPPLEMENTARY_CONTEXT")?,
                Err(_) => defaults.supplementary_context,
            },

            discovery_poi_radius_km: env::var("DISCOVERY_POI_RADIUS_KM")
                .unwrap_or_else(|_| defaults.discovery_poi_radius_km.to_string())
                .parse()
                .map_err(|_| "Invalid DISCOVERY_POI_RADIUS_KM")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ai_max_retries == 0 {
            return Err("AI_MAX_RETRIES must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_interest_overlap) {
            return Err("MIN_INTEREST_OVERLAP must be between 0 and 1".to_string());
        }
        if self.similar_days_tolerance < 0 {
            return Err("SIMILAR_DAYS_TOLERANCE must not be negative".to_string());
        }
        if self.max_prompt_chars_standard < 2_000 || self.max_prompt_chars_pro < 2_000 {
            return Err("Prompt size bounds must be at least 2000 characters".to_string());
        }
        if self.plan_cache_ttl_days <= 0 {
            return Err("PLAN_CACHE_TTL_DAYS must be positive".to_string());
        }
        Ok(())
    }

    /// Model chain for a generation mode: primary first, fallbacks after, no repeats.
    pub fn model_chain(&self, pro: bool) -> Vec<String> {
        let primary = if pro { &self.pro_model } else { &self.model };
        let mut chain = vec![primary.clone()];
        for model in &self.fallback_models {
            if !chain.contains(model) {
                chain.push(model.clone());
            }
        }
        chain
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        let images_enabled = match env::var("IMAGES_ENABLED") {
            Ok(raw) => parse_bool(&raw).map_err(|_| "Invalid IMAGES_ENABLED")?,
            Err(_) => true,
        };

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| "Invalid PORT")?,
            database_url: env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").ok(),
            groq_api_key: env::var("GROQ_API_KEY").map_err(|_| "GROQ_API_KEY must be set")?,
            groq_base_url: env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GROQ_BASE_URL.to_string()),
            directions_base_url: env::var("DIRECTIONS_BASE_URL").ok(),
            directions_api_key: env::var("DIRECTIONS_API_KEY").ok(),
            nominatim_base_url: env::var("NOMINATIM_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            geonames_username: env::var("GEONAMES_USERNAME").ok(),
            geonames_base_url: env::var("GEONAMES_BASE_URL")
                .unwrap_or_else(|_| "http://api.geonames.org".to_string()),
            images_enabled,
            plan_hot_cache_ttl: env::var("PLAN_HOT_CACHE_TTL")
                .unwrap_or_else(|_| DEFAULT_PLAN_HOT_CACHE_TTL_SECONDS.to_string())
                .parse()
                .map_err(|_| "Invalid PLAN_HOT_CACHE_TTL")?,
            location_cache_ttl: env::var("LOCATION_CACHE_TTL")
                .unwrap_or_else(|_| DEFAULT_LOCATION_CACHE_TTL_SECONDS.to_string())
                .parse()
                .map_err(|_| "Invalid LOCATION_CACHE_TTL")?,
            planner: PlannerConfig::from_env()?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
