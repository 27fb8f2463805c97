//! Route preview endpoint
//!
//! Returns the routing decision for an input without executing it, so a
//! consumer can show which model a run would use.

use axum::{extract::State, routing::post, Json, Router};

use crate::error::AppError;
use crate::types::{RoutePreviewRequest, RoutePreviewResponse};
use crate::AppState;

/// Build the route-preview router
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(preview_route))
}

async fn preview_route(
    State(state): State<AppState>,
    Json(request): Json<RoutePreviewRequest>,
) -> Result<Json<RoutePreviewResponse>, AppError> {
    let result = state
        .router
        .route_with_override(&request.input, request.model.as_deref())
        .await?;

    Ok(Json(RoutePreviewResponse {
        intent: result.intent,
        model: result.model,
        confidence: result.confidence,
        used_fallback: result.used_fallback,
    }))
}
