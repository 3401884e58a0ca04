use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Routing API error: {0}")]
    RoutingApi(String),

    #[error("Overpass API error: {0}")]
    OverpassApi(String),

    #[error("AI service error: {0}")]
    AiService(String),

    #[error("Invalid AI response: {0}")]
    AiResponse(String),

    #[error("Image service error: {0}")]
    Images(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// Malformed bodies answer with the same 400 shape as validation errors
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

// Convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal database error")
            }
            AppError::Geocoding(ref e) => {
                tracing::error!("Geocoding error: {}", e);
                (StatusCode::BAD_GATEWAY, "Geocoding service error")
            }
            AppError::RoutingApi(ref e) => {
                tracing::error!("Routing API error: {}", e);
                (StatusCode::BAD_GATEWAY, "Routing service error")
            }
            AppError::OverpassApi(ref e) => {
                tracing::error!("Overpass API error: {}", e);
                (StatusCode::BAD_GATEWAY, "Place data service error")
            }
            AppError::AiService(ref e) => {
                tracing::error!("AI service error: {}", e);
                (StatusCode::BAD_GATEWAY, "Itinerary generation service error")
            }
            AppError::AiResponse(ref e) => {
                tracing::warn!("Invalid AI response: {}", e);
                (StatusCode::BAD_GATEWAY, "Itinerary generation returned an invalid plan")
            }
            AppError::Images(ref e) => {
                tracing::warn!("Image service error: {}", e);
                (StatusCode::BAD_GATEWAY, "Image service error")
            }
            AppError::Cache(ref e) => {
                tracing::warn!("Cache error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error")
            }
            AppError::InvalidRequest(ref e) => (StatusCode::BAD_REQUEST, e.as_str()),
            AppError::NotFound(ref e) => (StatusCode::NOT_FOUND, e.as_str()),
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": status.canonical_reason().unwrap_or("Unknown error"),
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
