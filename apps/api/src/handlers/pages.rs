use axum::Json;
use axum::extract::{Extension, State};
use chrono::Utc;
use warden_core::PrincipalContext;

use crate::dto::{
    AdminConsoleResponse, DashboardResponse, OnboardingResponse, RoleAssignmentResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn onboarding_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<OnboardingResponse>> {
    let landing = state
        .authorization_service
        .landing_page(principal.principal_id())
        .await?;

    Ok(Json(OnboardingResponse {
        principal_id: principal.principal_id().to_string(),
        email: principal.email().to_owned(),
        landing: landing.path(),
    }))
}

pub async fn dashboard_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<DashboardResponse>> {
    let landing = state
        .authorization_service
        .landing_page(principal.principal_id())
        .await?;
    let now = Utc::now();
    let memberships = state
        .role_admin_service
        .list_for_principal(&principal, principal.principal_id())
        .await?
        .iter()
        .filter(|assignment| assignment.is_effective_at(now))
        .map(|assignment| RoleAssignmentResponse::from_assignment(assignment, now))
        .collect();

    Ok(Json(DashboardResponse {
        principal_id: principal.principal_id().to_string(),
        email: principal.email().to_owned(),
        landing: landing.path(),
        memberships,
    }))
}

pub async fn admin_console_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<AdminConsoleResponse>> {
    let organizations = state.role_admin_service.list_organizations(&principal).await?;
    let active = organizations
        .iter()
        .filter(|organization| organization.is_active)
        .count();

    Ok(Json(AdminConsoleResponse {
        principal_id: principal.principal_id().to_string(),
        organization_count: u32::try_from(organizations.len()).unwrap_or(u32::MAX),
        active_organization_count: u32::try_from(active).unwrap_or(u32::MAX),
    }))
}
