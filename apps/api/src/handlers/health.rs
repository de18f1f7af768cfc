use axum::Json;
use axum::extract::State;
use warden_core::OrganizationId;

use crate::dto::HealthResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Round-trips the store so load balancers stop routing when it is down.
pub async fn readiness_handler(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .organization_repository
        .find_organization(OrganizationId::new())
        .await?;

    Ok(Json(HealthResponse { status: "ready" }))
}
