//! HTTP API handlers and routing.

pub mod error;
mod extract;
mod health;
mod quotas;
mod status;

use axum::{
    http::{header, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub use extract::ApiJson;
pub use health::HealthResponse;
pub use quotas::{
    AllocateRequest, AllocateResponse, QuotaQuery, RecommendationsResponse, RefreshResponse,
};
pub use status::DependencyStatus;

/// Create the API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .merge(health::routes())
        .merge(status::routes())
        .merge(quotas::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
