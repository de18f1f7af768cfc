use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use warden_application::{CreateOrganizationInput, GrantRoleInput, RequestMetadata};
use warden_core::{AppError, OrganizationId, PrincipalContext, PrincipalId};
use warden_domain::{Permission, RoleAssignmentId, RoleKind, SubscriptionPlan};

use crate::dto::{
    CreateOrganizationRequest, GrantRoleRequest, OrganizationResponse, RoleAssignmentResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_organizations_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<Vec<OrganizationResponse>>> {
    let organizations = state
        .role_admin_service
        .list_organizations(&principal)
        .await?
        .into_iter()
        .map(OrganizationResponse::from)
        .collect();

    Ok(Json(organizations))
}

pub async fn create_organization_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<OrganizationResponse>)> {
    let organization = state
        .role_admin_service
        .create_organization(
            &principal,
            CreateOrganizationInput {
                slug: payload.slug,
                name: payload.name,
                plan: SubscriptionPlan::from_str(payload.plan.trim())?,
            },
            &metadata,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(OrganizationResponse::from(organization))))
}

pub async fn deactivate_organization_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<OrganizationResponse>> {
    set_organization_active(state, principal, metadata, &organization_id, false).await
}

pub async fn activate_organization_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<OrganizationResponse>> {
    set_organization_active(state, principal, metadata, &organization_id, true).await
}

async fn set_organization_active(
    state: AppState,
    principal: PrincipalContext,
    metadata: RequestMetadata,
    organization_id: &str,
    is_active: bool,
) -> ApiResult<Json<OrganizationResponse>> {
    let organization = state
        .role_admin_service
        .set_organization_active(
            &principal,
            OrganizationId::parse(organization_id)?,
            is_active,
            &metadata,
        )
        .await?;

    Ok(Json(OrganizationResponse::from(organization)))
}

pub async fn list_principal_roles_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Path(principal_id): Path<String>,
) -> ApiResult<Json<Vec<RoleAssignmentResponse>>> {
    let now = Utc::now();
    let assignments = state
        .role_admin_service
        .list_for_principal(&principal, PrincipalId::parse(&principal_id)?)
        .await?
        .iter()
        .map(|assignment| RoleAssignmentResponse::from_assignment(assignment, now))
        .collect();

    Ok(Json(assignments))
}

pub async fn grant_role_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(principal_id): Path<String>,
    Json(payload): Json<GrantRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleAssignmentResponse>)> {
    let input = grant_input(PrincipalId::parse(&principal_id)?, payload)?;
    let assignment = state
        .role_admin_service
        .grant_role(&principal, input, &metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RoleAssignmentResponse::from_assignment(&assignment, Utc::now())),
    ))
}

pub async fn revoke_role_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(assignment_id): Path<String>,
) -> ApiResult<Json<RoleAssignmentResponse>> {
    let assignment = state
        .role_admin_service
        .revoke_role(
            &principal,
            RoleAssignmentId::parse(&assignment_id)?,
            None,
            &metadata,
        )
        .await?;

    Ok(Json(RoleAssignmentResponse::from_assignment(
        &assignment,
        Utc::now(),
    )))
}

fn grant_input(
    principal_id: PrincipalId,
    payload: GrantRoleRequest,
) -> Result<GrantRoleInput, AppError> {
    let expires_at = payload
        .expires_at
        .as_deref()
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .map_err(|error| {
                    AppError::Validation(format!("invalid expires_at '{value}': {error}"))
                })
        })
        .transpose()?;

    Ok(GrantRoleInput {
        principal_id,
        role_kind: RoleKind::from_str(payload.role_kind.trim())?,
        organization_id: payload
            .organization_id
            .as_deref()
            .map(OrganizationId::parse)
            .transpose()?,
        permission_overrides: payload
            .permission_overrides
            .iter()
            .map(|permission| Permission::from_transport(permission.trim()))
            .collect::<Result<_, _>>()?,
        expires_at,
    })
}
