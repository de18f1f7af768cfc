use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use warden_application::AuditLogQuery;
use warden_core::{OrganizationId, PrincipalId};
use warden_domain::AuditAction;

use crate::dto::AuditEventResponse;
use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub organization_id: Option<String>,
}

impl AuditLogParams {
    fn into_query(self) -> ApiResult<AuditLogQuery> {
        Ok(AuditLogQuery {
            limit: self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
            action: self
                .action
                .as_deref()
                .map(|value| AuditAction::from_str(value.trim()))
                .transpose()?,
            actor_id: self
                .actor_id
                .as_deref()
                .map(PrincipalId::parse)
                .transpose()?,
            organization_id: self
                .organization_id
                .as_deref()
                .map(OrganizationId::parse)
                .transpose()?,
        })
    }
}

pub async fn list_audit_log_handler(
    State(state): State<AppState>,
    Query(params): Query<AuditLogParams>,
) -> ApiResult<Json<Vec<AuditEventResponse>>> {
    let events = state
        .audit_service
        .list_events(params.into_query()?)
        .await?
        .into_iter()
        .map(AuditEventResponse::from)
        .collect();

    Ok(Json(events))
}
