use crate::error::{AppError, Result};
use crate::models::{Activity, Location, Restaurant};
use crate::normalize::slugify;
use crate::services::ResolvedLocation;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DETAIL_ACTIVITY_LIMIT: i64 = 50;
const DETAIL_RESTAURANT_LIMIT: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    /// Free-text place name, e.g. "Annecy, France"
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct LocationDetails {
    pub location: Location,
    pub activities: Vec<Activity>,
    pub restaurants: Vec<Restaurant>,
}

/// GET /locations/resolve?q=
pub async fn resolve_location(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<ResolvedLocation>> {
    if params.q.trim().is_empty() {
        return Err(AppError::InvalidRequest("q must not be empty".to_string()));
    }
    let resolved = state.planner.discovery().resolve(&params.q).await?;
    Ok(Json(resolved))
}

/// GET /locations/{slug}
pub async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<LocationDetails>> {
    let slug = slugify(&slug);
    let location = state
        .locations
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location '{}' not found", slug)))?;

    let (activities, restaurants) = tokio::try_join!(
        state.locations.activities_for(location.id, DETAIL_ACTIVITY_LIMIT),
        state.locations.restaurants_for(location.id, DETAIL_RESTAURANT_LIMIT),
    )?;

    tracing::debug!(
        slug = %location.slug,
        activities = activities.len(),
        restaurants = restaurants.len(),
        "Location details"
    );

    Ok(Json(LocationDetails {
        location,
        activities,
        restaurants,
    }))
}
