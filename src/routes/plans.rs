use crate::db::CachedItinerary;
use crate::error::{AppError, Result};
use crate::models::TripRequest;
use crate::services::PlanResult;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;

/// POST /plans
/// Generate a day-by-day plan, or serve an equivalent cached one
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TripRequest>, JsonRejection>,
) -> Result<Json<PlanResult>> {
    let Json(request) = payload?;
    tracing::info!(
        from = %request.from,
        to = %request.to,
        stops = request.stops.len(),
        start = %request.start_date,
        end = %request.end_date,
        mode = %request.transport_mode,
        pro = request.pro_mode,
        "Plan request"
    );

    let result = state.planner.generate(&request).await?;

    tracing::info!(
        cache_key = %result.cache_key,
        status = ?result.cache_status,
        days = result.stats.day_count,
        "Plan ready"
    );

    Ok(Json(result))
}

/// GET /plans/{key}
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CachedItinerary>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::InvalidRequest("Plan key must not be empty".to_string()));
    }

    state
        .planner
        .find_plan(key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No plan stored under '{}'", key)))
}
