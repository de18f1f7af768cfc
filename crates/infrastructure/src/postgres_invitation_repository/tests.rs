use chrono::{Duration, Utc};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use warden_application::{
    InvitationAcceptance, InvitationRepository, OrganizationRepository, RoleAssignmentRepository,
};
use warden_core::{AppError, NonEmptyString, OrganizationId, PrincipalId};
use warden_domain::{
    EmailAddress, Invitation, InvitationStatus, Organization, OrganizationSlug, RoleKind,
    SubscriptionPlan,
};

use super::PostgresInvitationRepository;
use crate::{PostgresOrganizationRepository, PostgresRoleAssignmentRepository};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres invitation tests: {error}");
    }

    Some(pool)
}

async fn create_organization(pool: &PgPool) -> OrganizationId {
    let Ok(slug) = OrganizationSlug::new(format!("invites-{}", OrganizationId::new())) else {
        panic!("slug should be valid");
    };
    let Ok(name) = NonEmptyString::new("Invitation Org") else {
        panic!("name should be valid");
    };
    let organization = Organization::new(slug, name, SubscriptionPlan::Free, Utc::now());
    let organization_id = organization.id;

    let repository = PostgresOrganizationRepository::new(pool.clone());
    assert!(repository.create_organization(organization).await.is_ok());
    organization_id
}

fn invitation(email: &str, organization_id: OrganizationId, token_hash: &str) -> Invitation {
    let Ok(email) = EmailAddress::new(email) else {
        panic!("email should be valid");
    };
    let Ok(invitation) = Invitation::new(
        email,
        organization_id,
        RoleKind::User,
        PrincipalId::new(),
        token_hash.to_owned(),
        Utc::now(),
        Duration::hours(72),
    ) else {
        panic!("invitation should be valid");
    };
    invitation
}

fn unique_hash(label: &str) -> String {
    format!("{label}-{}", OrganizationId::new())
}

#[tokio::test]
async fn open_invitation_is_unique_per_email_and_organization() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresInvitationRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let first = invitation("b@acme.io", organization_id, &unique_hash("first"));
    let second = invitation("b@acme.io", organization_id, &unique_hash("second"));

    assert!(repository.save_open(&first).await.is_ok());
    assert!(matches!(
        repository.save_open(&second).await,
        Err(AppError::Conflict(_))
    ));

    let Ok(email) = EmailAddress::new("B@Acme.io") else {
        panic!("email should be valid");
    };
    let open = repository.find_open(&email, organization_id).await.ok().flatten();
    assert!(matches!(open, Some(found) if found.id == first.id));

    let Ok(revoked) = repository.revoke(first.id, Utc::now()).await else {
        panic!("revoke should succeed");
    };
    assert_eq!(revoked.status, InvitationStatus::Revoked);
    assert!(matches!(
        repository.revoke(first.id, Utc::now()).await,
        Err(AppError::InvitationAlreadyProcessed(_))
    ));

    assert!(repository.save_open(&second).await.is_ok());
}

#[tokio::test]
async fn reissue_updates_the_row_in_place() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresInvitationRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let mut stored = invitation("c@acme.io", organization_id, &unique_hash("old"));
    assert!(repository.save_open(&stored).await.is_ok());

    let new_hash = unique_hash("new");
    let inviter = PrincipalId::new();
    assert!(
        stored
            .reissue(
                RoleKind::OrgAdmin,
                inviter,
                new_hash.clone(),
                Utc::now(),
                Duration::hours(24),
            )
            .is_ok()
    );
    assert!(repository.save_open(&stored).await.is_ok());

    let Some(found) = repository.find_by_token_hash(&new_hash).await.ok().flatten() else {
        panic!("reissued invitation should be found by its new hash");
    };
    assert_eq!(found.id, stored.id);
    assert_eq!(found.role_kind, RoleKind::OrgAdmin);
    assert_eq!(found.invited_by, inviter);

    let listed = repository
        .list_for_organization(organization_id)
        .await
        .unwrap_or_default();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn concurrent_acceptances_create_one_assignment() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresInvitationRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let token_hash = unique_hash("accept");
    let pending = invitation("d@acme.io", organization_id, &token_hash);
    assert!(repository.save_open(&pending).await.is_ok());

    let principal_id = PrincipalId::new();
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let repository = repository.clone();
            let acceptance = InvitationAcceptance {
                invitation_id: pending.id,
                token_hash: token_hash.clone(),
                principal_id,
                accepted_at: Utc::now(),
            };
            tokio::spawn(async move { repository.complete_acceptance(acceptance).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        let Ok(result) = task.await else {
            panic!("acceptance task should not panic");
        };
        match result {
            Ok(outcome) => {
                accepted += 1;
                assert_eq!(outcome.invitation.status, InvitationStatus::Accepted);
            }
            Err(AppError::InvitationAlreadyProcessed(_)) | Err(AppError::AlreadyMember(_)) => {}
            Err(error) => panic!("unexpected acceptance error: {error}"),
        }
    }
    assert_eq!(accepted, 1);

    let assignments = PostgresRoleAssignmentRepository::new(pool)
        .list_for_organization(organization_id)
        .await
        .unwrap_or_default();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].principal_id(), principal_id);
}

#[tokio::test]
async fn acceptance_with_stale_token_hash_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresInvitationRepository::new(pool.clone());
    let organization_id = create_organization(&pool).await;
    let pending = invitation("e@acme.io", organization_id, &unique_hash("current"));
    assert!(repository.save_open(&pending).await.is_ok());

    let result = repository
        .complete_acceptance(InvitationAcceptance {
            invitation_id: pending.id,
            token_hash: unique_hash("stale"),
            principal_id: PrincipalId::new(),
            accepted_at: Utc::now(),
        })
        .await;
    assert!(matches!(
        result,
        Err(AppError::InvitationAlreadyProcessed(_))
    ));
}
