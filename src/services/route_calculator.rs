use crate::constants::{FLIGHT_OVERHEAD_HOURS, OVERNIGHT_STOP_MATCH_RADIUS_KM};
use crate::error::{AppError, Result};
use crate::models::{
    Coordinates, DayAllocation, Location, OvernightStop, RouteInfo, RouteLeg, RouteProvider,
    TransportMode, Waypoint,
};
use crate::services::directions::{DirectionsProvider, DirectionsResponse};
use std::sync::Arc;

const DESTINATION_WEIGHT: f64 = 2.0;
const STOP_WEIGHT: f64 = 1.0;

/// Distance, duration and stop planning for an ordered list of trip locations.
#[derive(Clone)]
pub struct RouteCalculator {
    directions: Option<Arc<dyn DirectionsProvider>>,
}

impl RouteCalculator {
    pub fn new(directions: Option<Arc<dyn DirectionsProvider>>) -> Self {
        RouteCalculator { directions }
    }

    /// Sum of consecutive great-circle distances (km).
    pub fn haversine_chain(points: &[Coordinates]) -> f64 {
        points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
    }

    /// Travel time for one leg of `distance_km`.
    pub fn estimate_duration_hours(distance_km: f64, mode: TransportMode) -> f64 {
        let moving = distance_km / mode.average_speed_kmh();
        if mode == TransportMode::Flight {
            moving + FLIGHT_OVERHEAD_HOURS
        } else {
            moving
        }
    }

    /// Route through `locations` in order. Uses the routing API when the mode has
    /// a road profile and falls back to straight-line estimates otherwise.
    pub async fn calculate(&self, locations: &[Location], mode: TransportMode) -> Result<RouteInfo> {
        if locations.len() < 2 {
            return Err(AppError::InvalidRequest(
                "A route needs at least two locations".to_string(),
            ));
        }

        let points: Vec<Coordinates> = locations.iter().map(|l| l.coordinates).collect();

        if let (Some(profile), Some(provider)) = (mode.routing_profile(), &self.directions) {
            match provider.directions(&points, profile).await {
                Ok(response) => {
                    let route = Self::from_directions(locations, &response);
                    tracing::info!(
                        distance_km = %format!("{:.1}", route.total_distance_km),
                        duration_h = %format!("{:.1}", route.total_duration_hours),
                        legs = route.legs.len(),
                        mode = %mode,
                        "Route calculated via routing API"
                    );
                    return Ok(route);
                }
                Err(e) => {
                    tracing::warn!(
                        mode = %mode,
                        "Routing API failed, falling back to Haversine estimate: {}",
                        e
                    );
                }
            }
        }

        let route = Self::haversine_route(locations, mode);
        tracing::info!(
            distance_km = %format!("{:.1}", route.total_distance_km),
            duration_h = %format!("{:.1}", route.total_duration_hours),
            mode = %mode,
            "Route estimated from straight-line distances"
        );
        Ok(route)
    }

    fn haversine_route(locations: &[Location], mode: TransportMode) -> RouteInfo {
        let legs: Vec<RouteLeg> = locations
            .windows(2)
            .map(|w| {
                let distance_km = w[0].coordinates.distance_to(&w[1].coordinates) * mode.road_factor();
                RouteLeg {
                    from: w[0].name.clone(),
                    to: w[1].name.clone(),
                    distance_km,
                    duration_hours: Self::estimate_duration_hours(distance_km, mode),
                }
            })
            .collect();

        RouteInfo {
            total_distance_km: legs.iter().map(|l| l.distance_km).sum(),
            total_duration_hours: legs.iter().map(|l| l.duration_hours).sum(),
            legs,
            geometry: locations.iter().map(|l| l.coordinates).collect(),
            provider: RouteProvider::Haversine,
        }
    }

    fn from_directions(locations: &[Location], response: &DirectionsResponse) -> RouteInfo {
        let total_distance_km = response.distance_km();
        let total_duration_hours = response.duration_hours();
        let leg_count = locations.len() - 1;

        let legs: Vec<RouteLeg> = if response.legs.len() == leg_count {
            locations
                .windows(2)
                .zip(&response.legs)
                .map(|(w, leg)| RouteLeg {
                    from: w[0].name.clone(),
                    to: w[1].name.clone(),
                    distance_km: leg.distance_meters / 1000.0,
                    duration_hours: leg.duration_seconds / 3600.0,
                })
                .collect()
        } else {
            // Split the totals in proportion to straight-line leg lengths
            let straight: Vec<f64> = locations
                .windows(2)
                .map(|w| w[0].coordinates.distance_to(&w[1].coordinates))
                .collect();
            let straight_total: f64 = straight.iter().sum();
            locations
                .windows(2)
                .zip(&straight)
                .map(|(w, d)| {
                    let share = if straight_total > 0.0 {
                        d / straight_total
                    } else {
                        1.0 / leg_count as f64
                    };
                    RouteLeg {
                        from: w[0].name.clone(),
                        to: w[1].name.clone(),
                        distance_km: total_distance_km * share,
                        duration_hours: total_duration_hours * share,
                    }
                })
                .collect()
        };

        let mut geometry = response.to_coordinates();
        if geometry.len() < 2 {
            geometry = locations.iter().map(|l| l.coordinates).collect();
        }

        RouteInfo {
            total_distance_km,
            total_duration_hours,
            legs,
            geometry,
            provider: RouteProvider::RoutingApi,
        }
    }

    /// Stored locations worth a detour between consecutive trip locations.
    ///
    /// Candidates already on the trip are skipped. Each remaining candidate is
    /// scored by its smallest detour over all legs; those within `max_detour_km`
    /// are ranked by detour, then by distance from the start.
    pub fn find_waypoints(
        route: &RouteInfo,
        trip: &[Location],
        candidates: &[Location],
        max_detour_km: f64,
        limit: usize,
    ) -> Vec<Waypoint> {
        if trip.len() < 2 || limit == 0 {
            return Vec::new();
        }

        let leg_starts: Vec<f64> = trip
            .windows(2)
            .scan(0.0, |acc, w| {
                let start = *acc;
                *acc += w[0].coordinates.distance_to(&w[1].coordinates);
                Some(start)
            })
            .collect();

        let mut waypoints: Vec<Waypoint> = candidates
            .iter()
            .filter(|c| !trip.iter().any(|t| t.id == c.id || t.slug == c.slug))
            .filter_map(|candidate| {
                let (leg_index, detour_km) = trip
                    .windows(2)
                    .map(|w| candidate.coordinates.detour_km(&w[0].coordinates, &w[1].coordinates))
                    .enumerate()
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;

                if detour_km > max_detour_km {
                    return None;
                }

                let distance_from_start_km = match candidate
                    .coordinates
                    .distance_to_linestring(&route.geometry)
                {
                    Some((_, _, along)) => along,
                    None => {
                        leg_starts[leg_index]
                            + trip[leg_index].coordinates.distance_to(&candidate.coordinates)
                    }
                };

                Some(Waypoint {
                    location: candidate.clone(),
                    leg_index,
                    detour_km,
                    distance_from_start_km,
                })
            })
            .collect();

        waypoints.sort_by(|a, b| {
            a.detour_km
                .total_cmp(&b.detour_km)
                .then_with(|| a.distance_from_start_km.total_cmp(&b.distance_from_start_km))
        });
        waypoints.truncate(limit);
        waypoints
    }

    /// Points along the route where a traveller runs out of daily travel time.
    pub fn overnight_stops(
        route: &RouteInfo,
        mode: TransportMode,
        known: &[Location],
    ) -> Vec<OvernightStop> {
        let daily_km = mode.max_travel_hours_per_day() * mode.average_speed_kmh();
        if daily_km <= 0.0 || route.total_distance_km <= daily_km || route.geometry.len() < 2 {
            return Vec::new();
        }

        let geometry_km = Self::haversine_chain(&route.geometry);
        let mut stops = Vec::new();
        let mut night = 1;

        while (night as f64) * daily_km < route.total_distance_km {
            let distance_from_start_km = night as f64 * daily_km;
            let fraction = distance_from_start_km / route.total_distance_km;
            let coordinates = point_along(&route.geometry, fraction * geometry_km);

            let nearest_location = known
                .iter()
                .map(|l| (l.coordinates.distance_to(&coordinates), l))
                .filter(|(d, _)| *d <= OVERNIGHT_STOP_MATCH_RADIUS_KM)
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, l)| l.name.clone());

            stops.push(OvernightStop {
                night,
                coordinates,
                distance_from_start_km,
                nearest_location,
            });
            night += 1;
        }

        tracing::debug!(count = stops.len(), daily_km, "Computed overnight stops");
        stops
    }

    /// Split `total_days` over the stays (ordered stops, then the destination).
    pub fn allocate_days(total_days: u32, stays: &[Location]) -> Vec<DayAllocation> {
        let Some(destination_idx) = stays.len().checked_sub(1) else {
            return Vec::new();
        };

        let mut days = vec![0u32; stays.len()];

        if (total_days as usize) < stays.len() {
            // Destination keeps one day, earliest stops get the rest
            if total_days > 0 {
                days[destination_idx] = 1;
                for d in days.iter_mut().take(total_days as usize - 1) {
                    *d = 1;
                }
            }
        } else {
            let weights: Vec<f64> = (0..stays.len())
                .map(|i| {
                    if i == destination_idx {
                        DESTINATION_WEIGHT
                    } else {
                        STOP_WEIGHT
                    }
                })
                .collect();
            let weight_sum: f64 = weights.iter().sum();
            let spare = total_days - stays.len() as u32;

            let quotas: Vec<f64> = weights.iter().map(|w| spare as f64 * w / weight_sum).collect();
            for (d, q) in days.iter_mut().zip(&quotas) {
                *d = 1 + q.floor() as u32;
            }

            let mut leftover = total_days - days.iter().sum::<u32>();
            let mut order: Vec<usize> = (0..stays.len()).collect();
            order.sort_by(|&a, &b| {
                let frac_a = quotas[a] - quotas[a].floor();
                let frac_b = quotas[b] - quotas[b].floor();
                frac_b
                    .total_cmp(&frac_a)
                    .then_with(|| weights[b].total_cmp(&weights[a]))
                    .then_with(|| a.cmp(&b))
            });
            for idx in order {
                if leftover == 0 {
                    break;
                }
                days[idx] += 1;
                leftover -= 1;
            }
        }

        let mut next_day = 1;
        stays
            .iter()
            .zip(days)
            .map(|(stay, days)| {
                let allocation = DayAllocation {
                    slug: stay.slug.clone(),
                    name: stay.name.clone(),
                    start_day: next_day.min(total_days.max(1)),
                    days,
                    pass_through: days == 0,
                };
                next_day += days;
                allocation
            })
            .collect()
    }
}

/// Point `target_km` along a polyline, clamped to its ends.
fn point_along(path: &[Coordinates], target_km: f64) -> Coordinates {
    let mut travelled = 0.0;
    for w in path.windows(2) {
        let segment = w[0].distance_to(&w[1]);
        if segment > 0.0 && travelled + segment >= target_km {
            return w[0].interpolate(&w[1], (target_km - travelled) / segment);
        }
        travelled += segment;
    }
    path.last().copied().unwrap_or(Coordinates { lat: 0.0, lng: 0.0 })
}
