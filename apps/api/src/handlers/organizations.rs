use axum::Json;
use axum::extract::{Extension, Path, State};
use chrono::Utc;
use warden_application::RequestMetadata;
use warden_core::{OrganizationId, PrincipalContext};
use warden_domain::RoleAssignmentId;

use crate::dto::{OrganizationDashboardResponse, OrganizationResponse, RoleAssignmentResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_members_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<Vec<RoleAssignmentResponse>>> {
    let now = Utc::now();
    let members = state
        .role_admin_service
        .list_members(&principal, OrganizationId::parse(&organization_id)?)
        .await?
        .iter()
        .map(|assignment| RoleAssignmentResponse::from_assignment(assignment, now))
        .collect();

    Ok(Json(members))
}

/// Revokes a membership; the assignment must belong to the organization in the path.
pub async fn revoke_member_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path((organization_id, assignment_id)): Path<(String, String)>,
) -> ApiResult<Json<RoleAssignmentResponse>> {
    let assignment = state
        .role_admin_service
        .revoke_role(
            &principal,
            RoleAssignmentId::parse(&assignment_id)?,
            Some(OrganizationId::parse(&organization_id)?),
            &metadata,
        )
        .await?;

    Ok(Json(RoleAssignmentResponse::from_assignment(
        &assignment,
        Utc::now(),
    )))
}

pub async fn organization_settings_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<OrganizationResponse>> {
    let organization = state
        .role_admin_service
        .find_organization(&principal, OrganizationId::parse(&organization_id)?)
        .await?;

    Ok(Json(OrganizationResponse::from(organization)))
}

pub async fn organization_dashboard_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<OrganizationDashboardResponse>> {
    let overview = state
        .role_admin_service
        .organization_overview(&principal, OrganizationId::parse(&organization_id)?)
        .await?;

    Ok(Json(OrganizationDashboardResponse::from(overview)))
}
