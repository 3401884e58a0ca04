pub mod directions;
pub mod geocoding;
pub mod images;
pub mod llm;
pub mod location_discovery;
pub mod overpass;
pub mod route_calculator;
pub mod trip_planner;

pub use location_discovery::{LocationDiscovery, ResolutionSource, ResolvedLocation};
pub use route_calculator::RouteCalculator;
pub use trip_planner::{CacheStatus, PlanResult, TripPlanner, TripPlannerDeps};
