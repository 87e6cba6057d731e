//! Quota, allocation and recommendation endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use qorch_connectivity::RegionHealth;
use qorch_quota::{
    AllocationRejected, QuotaError, QuotaTable, RecommendationRequest, RecommendationResult,
    RegionAvailability,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::engine::quota_source;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/quotas", get(list_quotas))
        .route("/api/quotas/refresh", post(refresh_quotas))
        .route("/api/quotas/recommendations", post(recommend))
        .route("/api/quotas/summary", get(summarize))
        .route("/api/quotas/allocations", post(allocate))
        .route("/api/quotas/allocations/{id}", delete(release))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotaQuery {
    pub region: Option<String>,
    pub role: Option<String>,
}

async fn list_quotas(
    State(state): State<AppState>,
    Query(query): Query<QuotaQuery>,
) -> Json<QuotaTable> {
    let ledger = state.ledger().lock().await;
    Json(ledger.quotas_filtered(query.region.as_deref(), query.role.as_deref()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub source: String,
    pub entries: usize,
}

async fn refresh_quotas(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    let source = quota_source(state.config())
        .map_err(|e| ApiError::service_unavailable("source_not_configured", format!("{e:#}")))?;

    let origin = source.describe();
    // Fetch outside the ledger lock; only the swap is serialized.
    let table = source.fetch().await.map_err(|e| refresh_error(&e))?;

    let mut ledger = state.ledger().lock().await;
    ledger
        .replace_table(table, &origin)
        .map_err(|e| refresh_error(&e))?;
    Ok(Json(RefreshResponse {
        source: origin,
        entries: ledger.table().len(),
    }))
}

fn refresh_error(e: &QuotaError) -> ApiError {
    match e {
        QuotaError::SourceUnavailable(_) => {
            warn!(error = %e, "Quota refresh source unavailable");
            ApiError::service_unavailable("source_unavailable", e.to_string())
        }
        _ => {
            warn!(error = %e, "Quota refresh failed");
            ApiError::internal("refresh_failed", e.to_string())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<RecommendationResult>,
}

async fn recommend(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RecommendationRequest>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    request.validate()?;

    // Score a snapshot so region health lookups do not hold the ledger lock.
    let table = state.ledger().lock().await.table().clone();
    let recommendations = state.scorer().recommend(&table, &request).await;
    Ok(Json(RecommendationsResponse { recommendations }))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub role: Option<String>,
}

async fn summarize(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<RegionAvailability>>, ApiError> {
    let role = query
        .role
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing_role", "query parameter 'role' is required"))?;

    let ledger = state.ledger().lock().await;
    Ok(Json(ledger.summarize_availability(&role)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateRequest {
    pub region: String,
    pub sku: String,
    pub role: String,
    pub amount: i64,
    #[serde(alias = "applicationId")]
    pub application_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub id: String,
}

async fn allocate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AllocateRequest>,
) -> Result<(StatusCode, Json<AllocateResponse>), ApiError> {
    // Health lookups retry with backoff; keep them outside the ledger lock.
    let healthy = state
        .probe()
        .region_health(std::slice::from_ref(&req.region))
        .await
        .get(&req.region)
        .copied()
        .unwrap_or(true);
    if !healthy {
        let reason = AllocationRejected::RegionUnhealthy(req.region.clone());
        warn!(region = %req.region, application_id = %req.application_id, "Allocation rejected");
        return Err(reason.into());
    }

    let mut ledger = state.ledger().lock().await;
    let id = ledger
        .allocate(&req.region, &req.sku, &req.role, req.amount, &req.application_id)
        .await?;
    Ok((StatusCode::CREATED, Json(AllocateResponse { id })))
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut ledger = state.ledger().lock().await;
    if ledger.allocation(&id).is_none() {
        return Err(ApiError::not_found(
            "allocation_not_found",
            format!("allocation {id} not found"),
        ));
    }
    if !ledger.release(&id) {
        return Err(ApiError::internal(
            "persistence_failed",
            format!("failed to persist release of {id}"),
        ));
    }
    info!(allocation_id = %id, "Allocation released via API");
    Ok(StatusCode::NO_CONTENT)
}
