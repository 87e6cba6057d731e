//! Dependency status endpoints.
//!
//! Both return the probe result as JSON; an unavailable dependency answers
//! 503 with the same body.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use qorch_connectivity::ServiceCheck;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub dependency: &'static str,
    #[serde(flatten)]
    pub check: ServiceCheck,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/besu/status", get(ledger_status))
        .route("/api/azure/status", get(control_plane_status))
}

async fn ledger_status(State(state): State<AppState>) -> impl IntoResponse {
    respond("ledger_network", state.probe().check_network().await)
}

async fn control_plane_status(State(state): State<AppState>) -> impl IntoResponse {
    respond("control_plane", state.probe().check_control_plane().await)
}

fn respond(dependency: &'static str, check: ServiceCheck) -> (StatusCode, Json<DependencyStatus>) {
    let status = if check.available {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(DependencyStatus { dependency, check }))
}
