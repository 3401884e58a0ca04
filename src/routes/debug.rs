use crate::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// GET /debug/health - Check if services are working
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut status = json!({
        "status": "ok",
        "checks": {}
    });

    // Database reachability doubles as the location count
    match state.locations.count().await {
        Ok(count) => {
            status["checks"]["database"] = json!("ok");
            status["checks"]["location_count"] = json!(count);
        }
        Err(e) => {
            status["checks"]["database"] = json!({"error": e.to_string()});
            status["status"] = json!("error");
        }
    }

    let cache_healthy = state.plan_cache.health_check().await;
    let stats = state.plan_cache.get_stats().await;
    status["checks"]["cache"] = json!({
        "backend": state.plan_cache.backend_name(),
        "healthy": cache_healthy,
        "stats": stats,
    });
    if !cache_healthy && status["status"] == "ok" {
        status["status"] = json!("degraded");
    }

    Json(status)
}
