use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use warden_application::{
    AuditService, AuthorizationService, InvitationService, OrganizationRepository,
    RoleAdministrationService, RouteGuard,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub route_guard: RouteGuard,
    pub authorization_service: AuthorizationService,
    pub audit_service: AuditService,
    pub invitation_service: InvitationService,
    pub role_admin_service: RoleAdministrationService,
    pub organization_repository: Arc<dyn OrganizationRepository>,
    pub guard_timeout: Duration,
    pub trusted_proxies: Arc<[IpNet]>,
}
