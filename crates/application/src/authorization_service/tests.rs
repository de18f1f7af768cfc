use warden_domain::{DecisionReason, LandingPage, Permission, RoleKind, SubscriptionPlan};

use crate::test_support::Harness;

#[tokio::test]
async fn org_admin_is_confined_to_its_organization() {
    let harness = Harness::new();
    let admin = harness.principal("admin@a.example", "token-a").await;
    let org_a = harness.organization("org-a", SubscriptionPlan::Basic).await;
    let org_b = harness.organization("org-b", SubscriptionPlan::Basic).await;
    harness.grant(&admin, RoleKind::OrgAdmin, Some(org_a.id)).await;

    let in_a = harness
        .authorization
        .authorize(admin.id, Permission::ManageOrgUsers, Some(org_a.id))
        .await;
    assert!(matches!(in_a, Ok(decision) if decision.allowed));

    let in_b = harness
        .authorization
        .authorize(admin.id, Permission::ManageOrgUsers, Some(org_b.id))
        .await;
    assert!(matches!(
        in_b,
        Ok(decision) if !decision.allowed && decision.reason == DecisionReason::PermissionDenied
    ));

    let system_wide = harness
        .authorization
        .require(admin.id, Permission::ManageOrganizations, None)
        .await;
    assert!(matches!(system_wide, Err(warden_core::AppError::Forbidden(_))));
}

#[tokio::test]
async fn store_outage_is_an_error_not_a_denial() {
    let harness = Harness::new();
    let principal = harness.principal("someone@example.com", "token").await;
    harness.store.set_unavailable(true).await;

    let result = harness
        .authorization
        .authorize(principal.id, Permission::ViewPersonalDashboard, None)
        .await;
    assert!(matches!(&result, Err(error) if error.is_transient()));
}

#[tokio::test]
async fn personal_checks_and_landing_pages_follow_assignments() {
    let harness = Harness::new();
    let member = harness.principal("member@example.com", "token").await;
    let organization = harness.organization("members", SubscriptionPlan::Free).await;

    let Ok(before) = harness.authorization.landing_page(member.id).await else {
        panic!("landing page should resolve");
    };
    assert_eq!(before, LandingPage::Onboarding);
    let personal = harness
        .authorization
        .authorize_personal(member.id, Permission::ViewPersonalDashboard)
        .await;
    assert!(matches!(personal, Ok(decision) if !decision.allowed));

    harness
        .grant(&member, RoleKind::User, Some(organization.id))
        .await;

    let Ok(after) = harness.authorization.landing_page(member.id).await else {
        panic!("landing page should resolve");
    };
    assert_eq!(after, LandingPage::OrganizationDashboard(organization.id));
    let personal = harness
        .authorization
        .authorize_personal(member.id, Permission::ViewPersonalDashboard)
        .await;
    assert!(matches!(personal, Ok(decision) if decision.allowed));
}
