use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use warden_application::{InviteInput, RequestMetadata};
use warden_core::{OrganizationId, PrincipalContext};
use warden_domain::{InvitationId, RoleKind};

use crate::dto::{
    CreateInvitationRequest, InvitationResponse, InvitationViewResponse,
    IssuedInvitationResponse, RoleAssignmentResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// Shows the invitation behind a raw token; reachable without a session.
pub async fn view_invitation_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<InvitationViewResponse>> {
    let view = state.invitation_service.view(&token).await?;

    Ok(Json(InvitationViewResponse::from(view)))
}

pub async fn accept_invitation_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(token): Path<String>,
) -> ApiResult<Json<RoleAssignmentResponse>> {
    let assignment = state
        .invitation_service
        .accept(&token, &principal, &metadata)
        .await?;

    Ok(Json(RoleAssignmentResponse::from_assignment(
        &assignment,
        Utc::now(),
    )))
}

pub async fn list_invitations_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Path(organization_id): Path<String>,
) -> ApiResult<Json<Vec<InvitationResponse>>> {
    let now = Utc::now();
    let invitations = state
        .invitation_service
        .list_for_organization(&principal, OrganizationId::parse(&organization_id)?)
        .await?
        .iter()
        .map(|invitation| InvitationResponse::from_invitation(invitation, now))
        .collect();

    Ok(Json(invitations))
}

pub async fn create_invitation_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path(organization_id): Path<String>,
    Json(payload): Json<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<IssuedInvitationResponse>)> {
    let issued = state
        .invitation_service
        .invite(
            &principal,
            InviteInput {
                email: payload.email,
                organization_id: OrganizationId::parse(&organization_id)?,
                role_kind: RoleKind::from_str(payload.role_kind.trim())?,
            },
            &metadata,
        )
        .await?;

    let status = if issued.reissued {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(IssuedInvitationResponse::from_issued(&issued, Utc::now())),
    ))
}

pub async fn revoke_invitation_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(metadata): Extension<RequestMetadata>,
    Path((organization_id, invitation_id)): Path<(String, String)>,
) -> ApiResult<Json<InvitationResponse>> {
    let invitation = state
        .invitation_service
        .revoke(
            &principal,
            OrganizationId::parse(&organization_id)?,
            InvitationId::parse(&invitation_id)?,
            &metadata,
        )
        .await?;

    Ok(Json(InvitationResponse::from_invitation(
        &invitation,
        Utc::now(),
    )))
}
