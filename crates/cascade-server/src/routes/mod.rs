//! REST API routes

pub mod models;
pub mod route;

use axum::Router;

use crate::AppState;

/// Build the `/api` router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/models", models::router())
        .nest("/route", route::router())
}
