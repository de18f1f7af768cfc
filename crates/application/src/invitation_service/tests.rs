use chrono::{Duration, Utc};
use warden_core::AppError;
use warden_domain::{AuditAction, InvitationStatus, Organization, Principal, RoleKind, SubscriptionPlan};

use crate::test_support::{Harness, context};
use crate::{InviteInput, IssuedInvitation, RequestMetadata};

struct Fixture {
    harness: Harness,
    admin: Principal,
    organization: Organization,
}

async fn fixture(plan: SubscriptionPlan) -> Fixture {
    let harness = Harness::new();
    let admin = harness.principal("owner@acme.example", "admin-token").await;
    let organization = harness.organization("acme", plan).await;
    harness
        .grant(&admin, RoleKind::OrgAdmin, Some(organization.id))
        .await;
    Fixture {
        harness,
        admin,
        organization,
    }
}

impl Fixture {
    async fn invite(&self, email: &str) -> Result<IssuedInvitation, AppError> {
        self.harness
            .invitations
            .invite(
                &context(&self.admin),
                InviteInput {
                    email: email.to_owned(),
                    organization_id: self.organization.id,
                    role_kind: RoleKind::User,
                },
                &RequestMetadata::default(),
            )
            .await
    }
}

#[tokio::test]
async fn invite_then_accept_grants_exactly_one_assignment() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let invitee = fixture
        .harness
        .principal("new.hire@acme.example", "invitee-token")
        .await;

    let Ok(issued) = fixture.invite("New.Hire@acme.example").await else {
        panic!("invite should succeed");
    };
    assert!(!issued.reissued);
    assert_eq!(
        issued.invite_url,
        format!("https://warden.test/invite/{}", issued.raw_token)
    );
    assert_ne!(issued.invitation.token_hash, issued.raw_token);
    assert_eq!(fixture.harness.email.sent.lock().await.len(), 1);

    let accepted = fixture
        .harness
        .invitations
        .accept(&issued.raw_token, &context(&invitee), &RequestMetadata::default())
        .await;
    let Ok(assignment) = accepted else {
        panic!("accept should succeed");
    };
    assert_eq!(assignment.role_kind(), RoleKind::User);
    assert_eq!(assignment.organization_id(), Some(fixture.organization.id));

    let second = fixture
        .harness
        .invitations
        .accept(&issued.raw_token, &context(&invitee), &RequestMetadata::default())
        .await;
    assert!(matches!(second, Err(AppError::InvitationAlreadyProcessed(_))));

    let invitee_assignments: Vec<_> = fixture
        .harness
        .store
        .assignments()
        .await
        .into_iter()
        .filter(|assignment| assignment.principal_id() == invitee.id)
        .collect();
    assert_eq!(invitee_assignments.len(), 1);

    let events = fixture.harness.primary_audit.events.lock().await;
    assert!(
        events
            .iter()
            .any(|event| event.action == AuditAction::InvitationAccepted)
    );
}

#[tokio::test]
async fn reinvite_collapses_into_one_row_with_latest_token() {
    let fixture = fixture(SubscriptionPlan::Basic).await;

    let (Ok(first), Ok(second)) = (
        fixture.invite("pending@acme.example").await,
        fixture.invite("pending@acme.example").await,
    ) else {
        panic!("both invites should succeed");
    };
    assert!(second.reissued);
    assert_eq!(first.invitation.id, second.invitation.id);

    let stored = fixture.harness.store.invitations().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].token_hash, second.invitation.token_hash);

    let stale = fixture.harness.invitations.view(&first.raw_token).await;
    assert!(matches!(stale, Err(AppError::NotFound(_))));
    let current = fixture.harness.invitations.view(&second.raw_token).await;
    assert!(matches!(current, Ok(view) if view.status == InvitationStatus::Pending));
}

#[tokio::test]
async fn email_failure_still_audits_the_stored_invitation() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    fixture.harness.email.set_failing(true).await;

    let result = fixture.invite("unreachable@acme.example").await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));

    let stored = fixture.harness.store.invitations().await;
    assert_eq!(stored.len(), 1);

    let events = fixture.harness.primary_audit.events.lock().await;
    let Some(created) = events
        .iter()
        .find(|event| event.action == AuditAction::InvitationCreated)
    else {
        panic!("invitation.created should be recorded before the email is sent");
    };
    assert_eq!(created.resource_id, stored[0].id.to_string());
    assert!(fixture.harness.email.sent.lock().await.is_empty());
}

#[tokio::test]
async fn expired_invitation_is_read_lazily_and_reissued_in_place() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let invitee = fixture
        .harness
        .principal("late@acme.example", "late-token")
        .await;
    let Ok(issued) = fixture.invite("late@acme.example").await else {
        panic!("invite should succeed");
    };

    let mut lapsed = issued.invitation.clone();
    lapsed.expires_at = Utc::now() - Duration::minutes(1);
    fixture.harness.store.replace_invitation(lapsed).await;

    let view = fixture.harness.invitations.view(&issued.raw_token).await;
    assert!(matches!(view, Ok(view) if view.status == InvitationStatus::Expired));
    let stored = fixture.harness.store.invitations().await;
    assert_eq!(stored[0].status, InvitationStatus::Pending);

    let accept = fixture
        .harness
        .invitations
        .accept(&issued.raw_token, &context(&invitee), &RequestMetadata::default())
        .await;
    assert!(matches!(accept, Err(AppError::InvitationExpired(_))));

    let Ok(reissued) = fixture.invite("late@acme.example").await else {
        panic!("re-invite should succeed");
    };
    assert_eq!(reissued.invitation.id, issued.invitation.id);
    assert_eq!(reissued.invitation.status, InvitationStatus::Pending);
    assert!(reissued.invitation.expires_at > Utc::now());
    assert_ne!(reissued.raw_token, issued.raw_token);
}

#[tokio::test]
async fn existing_member_cannot_be_invited() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let member = fixture
        .harness
        .principal("member@acme.example", "member-token")
        .await;
    fixture
        .harness
        .grant(&member, RoleKind::User, Some(fixture.organization.id))
        .await;

    let result = fixture.invite("member@acme.example").await;
    assert!(matches!(result, Err(AppError::AlreadyMember(_))));
    assert!(fixture.harness.store.invitations().await.is_empty());
}

#[tokio::test]
async fn acceptance_requires_matching_email() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let stranger = fixture
        .harness
        .principal("stranger@elsewhere.example", "stranger-token")
        .await;
    let Ok(issued) = fixture.invite("intended@acme.example").await else {
        panic!("invite should succeed");
    };

    let result = fixture
        .harness
        .invitations
        .accept(&issued.raw_token, &context(&stranger), &RequestMetadata::default())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn seat_limit_counts_members_and_open_invitations() {
    let fixture = fixture(SubscriptionPlan::Free).await;
    for index in 0..4 {
        assert!(
            fixture
                .invite(&format!("seat{index}@acme.example"))
                .await
                .is_ok()
        );
    }

    let over_limit = fixture.invite("seat4@acme.example").await;
    assert!(matches!(over_limit, Err(AppError::Conflict(_))));

    let reissue = fixture.invite("seat0@acme.example").await;
    assert!(matches!(reissue, Ok(issued) if issued.reissued));
}

#[tokio::test]
async fn revoked_invitation_cannot_be_accepted() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let invitee = fixture
        .harness
        .principal("revoked@acme.example", "revoked-token")
        .await;
    let Ok(issued) = fixture.invite("revoked@acme.example").await else {
        panic!("invite should succeed");
    };

    let revoked = fixture
        .harness
        .invitations
        .revoke(
            &context(&fixture.admin),
            fixture.organization.id,
            issued.invitation.id,
            &RequestMetadata::default(),
        )
        .await;
    assert!(matches!(revoked, Ok(invitation) if invitation.status == InvitationStatus::Revoked));

    let accept = fixture
        .harness
        .invitations
        .accept(&issued.raw_token, &context(&invitee), &RequestMetadata::default())
        .await;
    assert!(matches!(accept, Err(AppError::InvitationAlreadyProcessed(_))));
}

#[tokio::test]
async fn non_admin_cannot_invite() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let member = fixture
        .harness
        .principal("plain@acme.example", "plain-token")
        .await;
    fixture
        .harness
        .grant(&member, RoleKind::User, Some(fixture.organization.id))
        .await;

    let result = fixture
        .harness
        .invitations
        .invite(
            &context(&member),
            InviteInput {
                email: "friend@acme.example".to_owned(),
                organization_id: fixture.organization.id,
                role_kind: RoleKind::User,
            },
            &RequestMetadata::default(),
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn concurrent_accepts_produce_one_assignment() {
    let fixture = fixture(SubscriptionPlan::Basic).await;
    let invitee = fixture
        .harness
        .principal("racer@acme.example", "racer-token")
        .await;
    let Ok(issued) = fixture.invite("racer@acme.example").await else {
        panic!("invite should succeed");
    };
    let invitee_context = context(&invitee);
    let metadata = RequestMetadata::default();

    let (first, second) = tokio::join!(
        fixture
            .harness
            .invitations
            .accept(&issued.raw_token, &invitee_context, &metadata),
        fixture
            .harness
            .invitations
            .accept(&issued.raw_token, &invitee_context, &metadata),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count(),
        1
    );

    let invitee_assignments = fixture
        .harness
        .store
        .assignments()
        .await
        .into_iter()
        .filter(|assignment| assignment.principal_id() == invitee.id)
        .count();
    assert_eq!(invitee_assignments, 1);
}
