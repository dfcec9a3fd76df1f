//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    templates: usize,
}

/// GET / — the service is ready to accept conversions once the template
/// catalog holds at least one definition.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Template catalog is empty", body = HealthResponse),
    )
)]
pub async fn check(State(state): State<AppState>) -> impl IntoResponse {
    let templates = state.registry.len();
    if templates > 0 {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                templates,
            }),
        )
    } else {
        tracing::error!("Health check failed: template registry is empty");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                templates,
            }),
        )
    }
}
