use crate::models::{Coordinates, Location};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteProvider {
    RoutingApi,
    Haversine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteLeg {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInfo {
    pub total_distance_km: f64,
    pub total_duration_hours: f64,
    pub legs: Vec<RouteLeg>,
    /// Path points; the trip locations themselves when no routing API answered
    pub geometry: Vec<Coordinates>,
    pub provider: RouteProvider,
}

/// A stored location close enough to the route to be worth a stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub location: Location,
    pub leg_index: usize,
    pub detour_km: f64,
    pub distance_from_start_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OvernightStop {
    pub night: u32,
    pub coordinates: Coordinates,
    pub distance_from_start_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayAllocation {
    pub slug: String,
    pub name: String,
    /// 1-based; for pass-through stops this is the day the stop is crossed
    pub start_day: u32,
    pub days: u32,
    pub pass_through: bool,
}
