use std::sync::Arc;

use chrono::Duration;
use warden_application::{
    AuditLogRepository, AuditRepository, AuditService, AuthorizationService, IdentityService,
    InvitationRepository, InvitationService, InvitationSettings, OrganizationRepository,
    RoleAdministrationService, RoleAssignmentRepository, RouteGuard,
};
use warden_core::AppError;
use warden_infrastructure::{
    InMemoryStore, PostgresAuditLogRepository, PostgresAuditRepository,
    PostgresInvitationRepository, PostgresOrganizationRepository,
    PostgresRoleAssignmentRepository, TracingAuditSink,
};

use crate::api_config::{ApiConfig, StoreBackend};
use crate::state::AppState;

use super::database::connect_and_migrate;
use super::email::build_email_service;
use super::identity::build_identity_provider;

struct RepositorySet {
    organizations: Arc<dyn OrganizationRepository>,
    assignments: Arc<dyn RoleAssignmentRepository>,
    invitations: Arc<dyn InvitationRepository>,
    audit: Arc<dyn AuditRepository>,
    audit_log: Arc<dyn AuditLogRepository>,
}

impl RepositorySet {
    fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            organizations: store.clone(),
            assignments: store.clone(),
            invitations: store.clone(),
            audit: store.clone(),
            audit_log: store,
        }
    }

    async fn postgres(database_url: &str) -> Result<Self, AppError> {
        let pool = connect_and_migrate(database_url).await?;
        Ok(Self {
            organizations: Arc::new(PostgresOrganizationRepository::new(pool.clone())),
            assignments: Arc::new(PostgresRoleAssignmentRepository::new(pool.clone())),
            invitations: Arc::new(PostgresInvitationRepository::new(pool.clone())),
            audit: Arc::new(PostgresAuditRepository::new(pool.clone())),
            audit_log: Arc::new(PostgresAuditLogRepository::new(pool)),
        })
    }
}

pub async fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let repositories = match &config.store_backend {
        StoreBackend::Postgres { database_url } => RepositorySet::postgres(database_url).await?,
        StoreBackend::Memory => RepositorySet::in_memory(),
    };

    let identity_service = IdentityService::new(build_identity_provider(config).await?);
    let authorization_service = AuthorizationService::new(
        repositories.assignments.clone(),
        repositories.organizations.clone(),
    );
    let audit_service = AuditService::new(
        repositories.audit,
        Arc::new(TracingAuditSink::new()),
        repositories.audit_log,
        config.audit_allowed_sample_rate,
    );

    let invitation_service = InvitationService::new(
        authorization_service.clone(),
        identity_service.clone(),
        repositories.invitations,
        repositories.assignments.clone(),
        repositories.organizations.clone(),
        build_email_service(config)?,
        audit_service.clone(),
        InvitationSettings {
            public_base_url: config.public_base_url.clone(),
            time_to_live: Duration::hours(config.invitation_ttl_hours),
        },
    );
    let role_admin_service = RoleAdministrationService::new(
        authorization_service.clone(),
        identity_service.clone(),
        repositories.assignments,
        repositories.organizations.clone(),
        audit_service.clone(),
    );

    Ok(AppState {
        route_guard: RouteGuard::new(
            identity_service,
            authorization_service.clone(),
            audit_service.clone(),
        ),
        authorization_service,
        audit_service,
        invitation_service,
        role_admin_service,
        organization_repository: repositories.organizations,
        guard_timeout: config.guard_timeout,
        trusted_proxies: Arc::from(config.trusted_proxies.clone()),
    })
}
