pub mod coordinates;
pub mod location;
pub mod plan;
pub mod route;
pub mod trip;

pub use coordinates::{BoundingBox, Coordinates};
pub use location::{
    rank_activities, rank_restaurants, Activity, ActivityCategory, Location, LocationMetadata,
    Restaurant,
};
pub use plan::{Accommodation, DayKind, ItemKind, Plan, PlanDay, PlanItem, PlanStats};
pub use route::{DayAllocation, OvernightStop, RouteInfo, RouteLeg, RouteProvider, Waypoint};
pub use trip::{BudgetLevel, TransportMode, TripRequest};
