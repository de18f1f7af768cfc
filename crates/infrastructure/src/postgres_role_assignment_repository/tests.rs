use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use warden_application::{
    GrantOutcome, OrganizationRepository, RoleAssignmentRepository, RoleGrant,
};
use warden_core::{AppError, NonEmptyString, OrganizationId, PrincipalId};
use warden_domain::{Organization, OrganizationSlug, Permission, RoleKind, SubscriptionPlan};

use super::PostgresRoleAssignmentRepository;
use crate::PostgresOrganizationRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres role assignment tests: {error}");
    }

    Some(pool)
}

async fn create_organization(pool: &PgPool) -> OrganizationId {
    let Ok(slug) = OrganizationSlug::new(format!("org-{}", OrganizationId::new())) else {
        panic!("slug should be valid");
    };
    let Ok(name) = NonEmptyString::new("Assignment Org") else {
        panic!("name should be valid");
    };
    let organization = Organization::new(slug, name, SubscriptionPlan::Basic, Utc::now());
    let organization_id = organization.id;

    let repository = PostgresOrganizationRepository::new(pool.clone());
    assert!(repository.create_organization(organization).await.is_ok());
    organization_id
}

fn grant(
    principal_id: PrincipalId,
    role_kind: RoleKind,
    organization_id: Option<OrganizationId>,
) -> RoleGrant {
    RoleGrant {
        principal_id,
        role_kind,
        organization_id,
        permission_overrides: BTreeSet::new(),
        expires_at: None,
        granted_at: Utc::now(),
    }
}

#[tokio::test]
async fn regrant_reactivates_and_replaces_role() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleAssignmentRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let principal_id = PrincipalId::new();

    let Ok(created) = repository
        .grant(grant(principal_id, RoleKind::User, Some(organization_id)))
        .await
    else {
        panic!("initial grant should succeed");
    };
    let assignment_id = created.assignment().id();
    assert!(repository.deactivate(assignment_id).await.is_ok());

    let mut promoted = grant(principal_id, RoleKind::OrgAdmin, Some(organization_id));
    promoted
        .permission_overrides
        .insert(Permission::ViewAuditLog);
    let Ok(GrantOutcome::Reactivated { previous, current }) = repository.grant(promoted).await
    else {
        panic!("second grant should reactivate");
    };
    assert_eq!(previous.role_kind(), RoleKind::User);
    assert_eq!(current.id(), assignment_id);

    let stored = repository.find_assignment(assignment_id).await.ok().flatten();
    let Some(stored) = stored else {
        panic!("assignment should be stored");
    };
    assert!(stored.is_active());
    assert_eq!(stored.role_kind(), RoleKind::OrgAdmin);
    assert!(stored.permission_overrides().contains(&Permission::ViewAuditLog));

    let listed = repository
        .list_for_organization(organization_id)
        .await
        .unwrap_or_default();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn system_and_organization_rows_are_separate_scopes() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleAssignmentRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let principal_id = PrincipalId::new();

    assert!(
        repository
            .grant(grant(principal_id, RoleKind::SystemAdmin, None))
            .await
            .is_ok()
    );
    assert!(
        repository
            .grant(grant(principal_id, RoleKind::User, Some(organization_id)))
            .await
            .is_ok()
    );
    assert!(matches!(
        repository
            .grant(grant(principal_id, RoleKind::SystemAdmin, None))
            .await,
        Err(AppError::AlreadyMember(_))
    ));

    let listed = repository
        .list_for_principal(principal_id)
        .await
        .unwrap_or_default();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn deactivating_unknown_assignment_is_not_found() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresRoleAssignmentRepository::new(pool);
    let result = repository
        .deactivate(warden_domain::RoleAssignmentId::new())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
