// Library exports for testing and reusability

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod normalize;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use error::{AppError, Result};

use cache::PlanCache;
use db::LocationRepository;
use services::TripPlanner;
use std::sync::Arc;

// App state for sharing across the application
pub struct AppState {
    pub planner: TripPlanner,
    pub locations: Arc<dyn LocationRepository>,
    pub plan_cache: Arc<dyn PlanCache>,
}
