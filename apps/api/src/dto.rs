use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use warden_application::{AuditEvent, InvitationView, IssuedInvitation, OrganizationOverview};
use warden_domain::{Invitation, Organization, RoleAssignment};

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// API representation of an organization.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/organization-response.ts"
)]
pub struct OrganizationResponse {
    pub organization_id: String,
    pub slug: String,
    pub name: String,
    pub plan: String,
    pub max_users: i32,
    pub is_active: bool,
    pub created_at: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(value: Organization) -> Self {
        Self {
            organization_id: value.id.to_string(),
            slug: value.slug.as_str().to_owned(),
            name: value.name.as_str().to_owned(),
            plan: value.plan.as_str().to_owned(),
            max_users: value.plan.limits().max_users,
            is_active: value.is_active,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Incoming payload for organization creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-organization-request.ts"
)]
pub struct CreateOrganizationRequest {
    pub slug: String,
    pub name: String,
    pub plan: String,
}

/// Dashboard summary of one organization.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/organization-dashboard-response.ts"
)]
pub struct OrganizationDashboardResponse {
    pub organization: OrganizationResponse,
    pub active_members: u32,
}

impl From<OrganizationOverview> for OrganizationDashboardResponse {
    fn from(value: OrganizationOverview) -> Self {
        Self {
            organization: OrganizationResponse::from(value.organization),
            active_members: u32::try_from(value.active_members).unwrap_or(u32::MAX),
        }
    }
}

/// API representation of a role assignment.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/role-assignment-response.ts"
)]
pub struct RoleAssignmentResponse {
    pub assignment_id: String,
    pub principal_id: String,
    pub role_kind: String,
    pub organization_id: Option<String>,
    pub permission_overrides: Vec<String>,
    pub is_active: bool,
    pub is_effective: bool,
    pub assigned_at: String,
    pub expires_at: Option<String>,
}

impl RoleAssignmentResponse {
    pub fn from_assignment(value: &RoleAssignment, now: DateTime<Utc>) -> Self {
        Self {
            assignment_id: value.id().to_string(),
            principal_id: value.principal_id().to_string(),
            role_kind: value.role_kind().as_str().to_owned(),
            organization_id: value.organization_id().map(|id| id.to_string()),
            permission_overrides: value
                .permission_overrides()
                .iter()
                .map(|permission| permission.as_str().to_owned())
                .collect(),
            is_active: value.is_active(),
            is_effective: value.is_effective_at(now),
            assigned_at: value.assigned_at().to_rfc3339(),
            expires_at: value.expires_at().map(|expires_at| expires_at.to_rfc3339()),
        }
    }
}

/// Incoming payload for a direct role grant.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/grant-role-request.ts"
)]
pub struct GrantRoleRequest {
    pub role_kind: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub permission_overrides: Vec<String>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Incoming payload for an invitation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-invitation-request.ts"
)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role_kind: String,
}

/// API representation of an invitation, with its effective status.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/invitation-response.ts"
)]
pub struct InvitationResponse {
    pub invitation_id: String,
    pub email: String,
    pub organization_id: String,
    pub role_kind: String,
    pub status: String,
    pub expires_at: String,
    pub created_at: String,
}

impl InvitationResponse {
    pub fn from_invitation(value: &Invitation, now: DateTime<Utc>) -> Self {
        Self {
            invitation_id: value.id.to_string(),
            email: value.email.as_str().to_owned(),
            organization_id: value.organization_id.to_string(),
            role_kind: value.role_kind.as_str().to_owned(),
            status: value.effective_status(now).as_str().to_owned(),
            expires_at: value.expires_at.to_rfc3339(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Result of issuing or re-issuing an invitation.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/issued-invitation-response.ts"
)]
pub struct IssuedInvitationResponse {
    pub invitation: InvitationResponse,
    pub invite_url: String,
    pub reissued: bool,
}

impl IssuedInvitationResponse {
    pub fn from_issued(value: &IssuedInvitation, now: DateTime<Utc>) -> Self {
        Self {
            invitation: InvitationResponse::from_invitation(&value.invitation, now),
            invite_url: value.invite_url.clone(),
            reissued: value.reissued,
        }
    }
}

/// Public view of an invitation, addressed by its token.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/invitation-view-response.ts"
)]
pub struct InvitationViewResponse {
    pub invitation_id: String,
    pub email: String,
    pub organization_id: String,
    pub organization_name: String,
    pub role_kind: String,
    pub status: String,
    pub expires_at: String,
}

impl From<InvitationView> for InvitationViewResponse {
    fn from(value: InvitationView) -> Self {
        Self {
            invitation_id: value.invitation_id.to_string(),
            email: value.email,
            organization_id: value.organization_id.to_string(),
            organization_name: value.organization_name,
            role_kind: value.role_kind.as_str().to_owned(),
            status: value.status.as_str().to_owned(),
            expires_at: value.expires_at.to_rfc3339(),
        }
    }
}

/// API representation of an audit event.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-event-response.ts"
)]
pub struct AuditEventResponse {
    pub event_id: String,
    pub actor_id: Option<String>,
    pub organization_id: Option<String>,
    pub action: String,
    pub severity: String,
    pub resource_type: String,
    pub resource_id: String,
    #[ts(type = "unknown")]
    pub old_value: Option<serde_json::Value>,
    #[ts(type = "unknown")]
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub occurred_at: String,
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(value: AuditEvent) -> Self {
        Self {
            event_id: value.id.to_string(),
            actor_id: value.actor_id.map(|id| id.to_string()),
            organization_id: value.organization_id.map(|id| id.to_string()),
            action: value.action.as_str().to_owned(),
            severity: value.severity().as_str().to_owned(),
            resource_type: value.resource_type,
            resource_id: value.resource_id,
            old_value: value.old_value,
            new_value: value.new_value,
            ip_address: value.ip_address,
            user_agent: value.user_agent,
            occurred_at: value.occurred_at.to_rfc3339(),
        }
    }
}

/// The authenticated principal and where they belong.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/dashboard-response.ts"
)]
pub struct DashboardResponse {
    pub principal_id: String,
    pub email: String,
    pub landing: String,
    pub memberships: Vec<RoleAssignmentResponse>,
}

/// Response for principals without any usable role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/onboarding-response.ts"
)]
pub struct OnboardingResponse {
    pub principal_id: String,
    pub email: String,
    pub landing: String,
}

/// Entry point of the system administration console.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/admin-console-response.ts"
)]
pub struct AdminConsoleResponse {
    pub principal_id: String,
    pub organization_count: u32,
    pub active_organization_count: u32,
}
