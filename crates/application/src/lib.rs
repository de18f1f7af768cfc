//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_ports;
mod audit_service;
mod authorization_ports;
mod authorization_service;
mod identity_service;
mod invitation_service;
mod role_admin_service;
mod route_guard;
pub mod route_policy;

#[cfg(test)]
mod test_support;

pub use audit_ports::{
    AuditEvent, AuditEventId, AuditLogQuery, AuditLogRepository, AuditRepository, RequestMetadata,
};
pub use audit_service::{AuditService, DecisionAudit};
pub use authorization_ports::{
    AcceptanceOutcome, GrantOutcome, InvitationAcceptance, InvitationRepository,
    OrganizationRepository, RoleAssignmentRepository, RoleGrant, resolve_acceptance,
    resolve_grant,
};
pub use authorization_service::AuthorizationService;
pub use identity_service::{IdentityProvider, IdentityService};
pub use invitation_service::{
    EmailService, InvitationService, InvitationSettings, InvitationView, InviteInput,
    IssuedInvitation,
};
pub use role_admin_service::{
    CreateOrganizationInput, GrantRoleInput, OrganizationOverview, RoleAdministrationService,
};
pub use route_guard::{GuardOutcome, GuardRequest, RouteGuard};
