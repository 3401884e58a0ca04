use crate::constants::*;
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityCategory, Coordinates, Restaurant};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Public Overpass API endpoints, tried round-robin
const OVERPASS_ENDPOINTS: &[&str] = &[
    "https://overpass-api.de/api/interpreter",
    "https://overpass.private.coffee/api/interpreter",
    "https://maps.mail.ru/osm/tools/overpass/api/interpreter",
];

/// Amenity values that describe a place to eat rather than an activity
const RESTAURANT_AMENITIES: &[&str] = &["restaurant", "cafe", "fast_food", "food_court", "bistro"];

#[derive(Debug, Clone, PartialEq)]
pub enum OsmPlaceKind {
    Activity(ActivityCategory),
    Restaurant { cuisine: Option<String> },
}

/// A named OpenStreetMap feature near a location.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmPlace {
    pub osm_id: i64,
    pub name: String,
    pub coordinates: Coordinates,
    pub kind: OsmPlaceKind,
    pub description: Option<String>,
}

impl OsmPlace {
    pub fn into_activity(self, location_id: Uuid) -> Option<Activity> {
        let OsmPlaceKind::Activity(category) = self.kind else {
            return None;
        };
        let mut activity = Activity::new(location_id, self.name, category);
        activity.coordinates = Some(self.coordinates);
        activity.description = self.description;
        activity.osm_id = Some(self.osm_id);
        Some(activity)
    }

    pub fn into_restaurant(self, location_id: Uuid) -> Option<Restaurant> {
        let OsmPlaceKind::Restaurant { cuisine } = self.kind else {
            return None;
        };
        let mut restaurant = Restaurant::new(location_id, self.name);
        restaurant.cuisine = cuisine;
        restaurant.coordinates = Some(self.coordinates);
        restaurant.osm_id = Some(self.osm_id);
        Some(restaurant)
    }
}

/// Source of named places around a point.
#[async_trait]
pub trait PlaceSource: Send + Sync {
    async fn fetch_places(
        &self,
        center: &Coordinates,
        radius_m: f64,
        categories: &[ActivityCategory],
    ) -> Result<Vec<OsmPlace>>;
}

/// OSM tag filters for a category. `"*"` matches any value.
pub fn category_to_osm_tags(category: &ActivityCategory) -> &'static [(&'static str, &'static str)] {
    match category {
        ActivityCategory::Sightseeing => &[("tourism", "attraction"), ("tourism", "viewpoint")],
        ActivityCategory::Museum => &[("tourism", "museum"), ("tourism", "gallery")],
        ActivityCategory::Nature => &[
            ("leisure", "park"),
            ("leisure", "garden"),
            ("leisure", "nature_reserve"),
        ],
        ActivityCategory::Outdoor => &[
            ("tourism", "camp_site"),
            ("leisure", "marina"),
            ("sport", "climbing"),
        ],
        ActivityCategory::Culture => &[
            ("amenity", "theatre"),
            ("amenity", "arts_centre"),
            ("tourism", "artwork"),
        ],
        ActivityCategory::Nightlife => &[
            ("amenity", "bar"),
            ("amenity", "pub"),
            ("amenity", "nightclub"),
        ],
        ActivityCategory::Shopping => &[("amenity", "marketplace"), ("shop", "mall")],
        ActivityCategory::Food => &[("amenity", "restaurant"), ("amenity", "cafe")],
        ActivityCategory::Beach => &[("natural", "beach"), ("leisure", "beach_resort")],
        ActivityCategory::Entertainment => &[
            ("tourism", "theme_park"),
            ("tourism", "zoo"),
            ("amenity", "cinema"),
        ],
        ActivityCategory::History => &[("historic", "*")],
        ActivityCategory::Other => &[],
    }
}

#[derive(Clone)]
pub struct OverpassClient {
    client: Client,
    endpoints: Vec<String>,
    current_endpoint_idx: Arc<AtomicUsize>,
    backoff_base: Duration,
}

impl OverpassClient {
    pub fn new() -> Self {
        Self::with_endpoints(OVERPASS_ENDPOINTS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_endpoints(endpoints: Vec<String>) -> Self {
        OverpassClient {
            client: Client::new(),
            endpoints,
            current_endpoint_idx: Arc::new(AtomicUsize::new(0)),
            backoff_base: Duration::from_millis(OVERPASS_RETRY_BASE_MS),
        }
    }

    /// First retry waits twice this long, each later one doubles again.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// 2x, 4x, 8x the base delay
    fn backoff(&self, attempt: usize) -> Duration {
        self.backoff_base * (1u32 << attempt.min(6))
    }

    fn next_endpoint(&self) -> Result<&str> {
        if self.endpoints.is_empty() {
            return Err(AppError::OverpassApi("No Overpass endpoint configured".to_string()));
        }
        let idx = self.current_endpoint_idx.fetch_add(1, Ordering::Relaxed);
        Ok(&self.endpoints[idx % self.endpoints.len()])
    }

    /// One POST against one endpoint.
    async fn attempt(&self, endpoint: &str, query: &str) -> Attempt {
        let sent = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("User-Agent", USER_AGENT)
            .body(format!("data={}", urlencoding::encode(query)))
            .timeout(Duration::from_secs(OVERPASS_QUERY_TIMEOUT_SECONDS + 5))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Attempt::Retry("request timed out".to_string()),
            Err(e) => return Attempt::Retry(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<OverpassResponse>().await {
                Ok(body) => Attempt::Done(convert_elements(body.elements)),
                Err(e) => Attempt::Fail(format!("unreadable response: {}", e)),
            };
        }

        let body = response.text().await.unwrap_or_default();
        let reason = format!("HTTP {}: {}", status, body.trim());
        match status.as_u16() {
            OVERPASS_HTTP_TOO_MANY_REQUESTS | OVERPASS_HTTP_GATEWAY_TIMEOUT => Attempt::Retry(reason),
            _ => Attempt::Fail(reason),
        }
    }

    /// Runs a query, rotating endpoints and backing off exponentially on
    /// timeouts, transport errors, 429 and 504.
    async fn execute_query_with_retry(&self, query: String, max_retries: usize) -> Result<Vec<OsmPlace>> {
        let attempts = max_retries + 1;
        for attempt in 1..=attempts {
            let endpoint = self.next_endpoint()?;
            match self.attempt(endpoint, &query).await {
                Attempt::Done(places) => return Ok(places),
                Attempt::Fail(reason) => return Err(AppError::OverpassApi(reason)),
                Attempt::Retry(reason) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Overpass {}, retrying",
                        reason
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Retry(reason) => {
                    return Err(AppError::OverpassApi(format!(
                        "{} after {} attempts",
                        reason, attempts
                    )));
                }
            }
        }
        Err(AppError::OverpassApi("no attempt made".to_string()))
    }
}

enum Attempt {
    Done(Vec<OsmPlace>),
    Retry(String),
    Fail(String),
}

impl Default for OverpassClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaceSource for OverpassClient {
    async fn fetch_places(
        &self,
        center: &Coordinates,
        radius_m: f64,
        categories: &[ActivityCategory],
    ) -> Result<Vec<OsmPlace>> {
        let query = build_query(center, radius_m, categories);
        tracing::debug!("Overpass query: {}", query);

        let places = self
            .execute_query_with_retry(query, OVERPASS_RETRY_MAX_ATTEMPTS)
            .await?;

        tracing::info!(
            lat = center.lat,
            lng = center.lng,
            radius_m,
            count = places.len(),
            "Fetched OSM places"
        );
        Ok(places)
    }
}

fn build_query(center: &Coordinates, radius_m: f64, categories: &[ActivityCategory]) -> String {
    let mut query_parts = vec![format!(
        "[out:json][timeout:{}][maxsize:536870912];(",
        OVERPASS_QUERY_TIMEOUT_SECONDS
    )];

    let mut seen = HashSet::new();
    for category in categories {
        for (key, value) in category_to_osm_tags(category) {
            if !seen.insert((*key, *value)) {
                continue;
            }
            let tag_query = if *value == "*" {
                format!(
                    r#"nwr["{}"]["name"](around:{},{},{});"#,
                    key, radius_m, center.lat, center.lng
                )
            } else {
                format!(
                    r#"nwr["{}"="{}"]["name"](around:{},{},{});"#,
                    key, value, radius_m, center.lat, center.lng
                )
            };
            query_parts.push(tag_query);
        }
    }

    query_parts.push(format!(");out center {};", OVERPASS_MAX_RESULTS));
    query_parts.join("\n")
}

/// Elements with a name, usable coordinates and a recognised tag, deduplicated by OSM id
fn convert_elements(elements: Vec<OverpassElement>) -> Vec<OsmPlace> {
    let mut seen_ids = HashSet::new();

    elements
        .into_iter()
        .filter_map(|elem| {
            let (lat, lon) = match (elem.lat, elem.lon, &elem.center) {
                (Some(lat), Some(lon), _) => (lat, lon),
                (_, _, Some(center)) => (center.lat, center.lon),
                _ => return None,
            };

            let coordinates = Coordinates::new(lat, lon).ok()?;
            let name = elem.tags.get("name")?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let kind = infer_kind(&elem.tags)?;
            let description = elem.tags.get("description").cloned();

            Some(OsmPlace {
                osm_id: elem.id,
                name,
                coordinates,
                kind,
                description,
            })
        })
        .filter(|place| seen_ids.insert(place.osm_id))
        .collect()
}

fn infer_kind(tags: &HashMap<String, String>) -> Option<OsmPlaceKind> {
    if let Some(amenity) = tags.get("amenity") {
        if RESTAURANT_AMENITIES.contains(&amenity.as_str()) {
            let cuisine = tags
                .get("cuisine")
                .map(|c| c.split(';').next().unwrap_or(c).trim().replace('_', " "))
                .filter(|c| !c.is_empty());
            return Some(OsmPlaceKind::Restaurant { cuisine });
        }
    }

    // More specific tags first
    check_tourism_tags(tags)
        .or_else(|| tags.get("historic").map(|_| ActivityCategory::History))
        .or_else(|| check_amenity_tags(tags))
        .or_else(|| check_leisure_tags(tags))
        .or_else(|| check_natural_tags(tags))
        .or_else(|| tags.get("shop").map(|_| ActivityCategory::Shopping))
        .or_else(|| tags.get("sport").map(|_| ActivityCategory::Outdoor))
        .map(OsmPlaceKind::Activity)
}

fn check_tourism_tags(tags: &HashMap<String, String>) -> Option<ActivityCategory> {
    tags.get("tourism").and_then(|t| match t.as_str() {
        "museum" | "gallery" => Some(ActivityCategory::Museum),
        "attraction" | "viewpoint" => Some(ActivityCategory::Sightseeing),
        "artwork" => Some(ActivityCategory::Culture),
        "theme_park" | "zoo" | "aquarium" => Some(ActivityCategory::Entertainment),
        "camp_site" => Some(ActivityCategory::Outdoor),
        _ => None,
    })
}

fn check_amenity_tags(tags: &HashMap<String, String>) -> Option<ActivityCategory> {
    tags.get("amenity").and_then(|a| match a.as_str() {
        "theatre" | "arts_centre" => Some(ActivityCategory::Culture),
        "bar" | "pub" | "nightclub" => Some(ActivityCategory::Nightlife),
        "marketplace" => Some(ActivityCategory::Shopping),
        "cinema" => Some(ActivityCategory::Entertainment),
        _ => None,
    })
}

fn check_leisure_tags(tags: &HashMap<String, String>) -> Option<ActivityCategory> {
    tags.get("leisure").and_then(|l| match l.as_str() {
        "park" | "garden" | "nature_reserve" => Some(ActivityCategory::Nature),
        "beach_resort" => Some(ActivityCategory::Beach),
        "marina" | "sports_centre" => Some(ActivityCategory::Outdoor),
        _ => None,
    })
}

fn check_natural_tags(tags: &HashMap<String, String>) -> Option<ActivityCategory> {
    tags.get("natural").and_then(|n| match n.as_str() {
        "beach" => Some(ActivityCategory::Beach),
        "peak" | "waterfall" | "cave_entrance" => Some(ActivityCategory::Nature),
        _ => None,
    })
}

// Overpass API response types

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    id: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}
