pub mod debug;
pub mod locations;
pub mod plans;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/plans", post(plans::create_plan))
        .route("/plans/{key}", get(plans::get_plan))
        .route("/locations/resolve", get(locations::resolve_location))
        .route("/locations/{slug}", get(locations::get_location))
        .route("/debug/health", get(debug::health_check))
        .with_state(state)
}
