use crate::constants::MAX_DIRECTIONS_WAYPOINTS;
use crate::error::{AppError, Result};
use crate::models::Coordinates;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DIRECTIONS_TIMEOUT_SECONDS: u64 = 15;

/// Road routing between ordered waypoints.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn directions(&self, waypoints: &[Coordinates], profile: &str)
        -> Result<DirectionsResponse>;
}

/// Client for the Mapbox / OSRM directions shape:
/// `GET {base}/{profile}/{lng,lat;lng,lat...}`.
#[derive(Clone)]
pub struct DirectionsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DirectionsClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        DirectionsClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl DirectionsProvider for DirectionsClient {
    async fn directions(
        &self,
        waypoints: &[Coordinates],
        profile: &str,
    ) -> Result<DirectionsResponse> {
        if waypoints.len() < 2 {
            return Err(AppError::InvalidRequest(
                "At least 2 waypoints required".to_string(),
            ));
        }

        if waypoints.len() > MAX_DIRECTIONS_WAYPOINTS {
            return Err(AppError::InvalidRequest(format!(
                "Maximum {} waypoints allowed",
                MAX_DIRECTIONS_WAYPOINTS
            )));
        }

        // Format coordinates as "lng,lat;lng,lat;..."
        let coordinates_str = waypoints
            .iter()
            .map(|c| format!("{},{}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");

        let url = format!("{}/{}/{}", self.base_url, profile, coordinates_str);

        tracing::debug!(
            waypoints = waypoints.len(),
            profile,
            "Directions API request"
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("steps", "false"),
            ])
            .timeout(Duration::from_secs(DIRECTIONS_TIMEOUT_SECONDS));

        if let Some(ref key) = self.api_key {
            request = request.query(&[("access_token", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::RoutingApi(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                status = %status,
                waypoints = waypoints.len(),
                "Directions API HTTP error: {}",
                error_text
            );
            return Err(AppError::RoutingApi(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let directions: DirectionsApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::RoutingApi(format!("Failed to parse response: {}", e)))?;

        directions.into_response()
    }
}

// Directions API response types

#[derive(Debug, Deserialize)]
struct DirectionsApiResponse {
    #[serde(default)]
    routes: Vec<ApiRoute>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    distance: f64, // meters
    duration: f64, // seconds
    geometry: ApiGeometry,
    #[serde(default)]
    legs: Vec<ApiLeg>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct ApiGeometry {
    coordinates: Vec<[f64; 2]>, // [lng, lat] pairs
}

impl DirectionsApiResponse {
    fn into_response(self) -> Result<DirectionsResponse> {
        let code = self.code.unwrap_or_else(|| "Ok".to_string());
        let Some(route) = self.routes.into_iter().next() else {
            tracing::warn!(code = %code, "Directions API returned no routes");
            return Err(AppError::RoutingApi(format!("No routes found ({})", code)));
        };

        tracing::debug!(
            distance_km = %format!("{:.1}", route.distance / 1000.0),
            duration_h = %format!("{:.1}", route.duration / 3600.0),
            path_points = route.geometry.coordinates.len(),
            "Directions API response"
        );

        Ok(DirectionsResponse {
            distance_meters: route.distance,
            duration_seconds: route.duration,
            legs: route
                .legs
                .into_iter()
                .map(|leg| LegSummary {
                    distance_meters: leg.distance,
                    duration_seconds: leg.duration,
                })
                .collect(),
            geometry: route.geometry.coordinates,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LegSummary {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectionsResponse {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub legs: Vec<LegSummary>,
    /// GeoJSON coordinates as [lng, lat] pairs
    pub geometry: Vec<[f64; 2]>,
}

impl DirectionsResponse {
    pub fn distance_km(&self) -> f64 {
        self.distance_meters / 1000.0
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_seconds / 3600.0
    }

    /// Convert GeoJSON coordinates to our Coordinates type
    pub fn to_coordinates(&self) -> Vec<Coordinates> {
        self.geometry
            .iter()
            .filter_map(|coord| Coordinates::new(coord[1], coord[0]).ok())
            .collect()
    }
}
