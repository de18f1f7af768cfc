use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use warden_core::{AppError, AppResult, NonEmptyString, OrganizationId, PrincipalContext, PrincipalId};
use warden_domain::{
    AuditAction, Organization, OrganizationSlug, Permission, RoleAssignment, RoleAssignmentId,
    RoleKind, SubscriptionPlan,
};

use crate::{
    AuditEvent, AuditService, AuthorizationService, GrantOutcome, IdentityService,
    OrganizationRepository, RequestMetadata, RoleAssignmentRepository, RoleGrant,
};

/// Input payload for granting a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRoleInput {
    /// Principal receiving the role.
    pub principal_id: PrincipalId,
    /// Role kind to grant.
    pub role_kind: RoleKind,
    /// Organization scope; must be `None` exactly for system administrators.
    pub organization_id: Option<OrganizationId>,
    /// Extra permissions on top of the role defaults.
    pub permission_overrides: BTreeSet<Permission>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Input payload for creating organizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrganizationInput {
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Subscription plan.
    pub plan: SubscriptionPlan,
}

/// Organization summary shown on its dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationOverview {
    /// The organization.
    pub organization: Organization,
    /// Members holding an effective role.
    pub active_members: usize,
}

/// Application service for role and organization administration.
#[derive(Clone)]
pub struct RoleAdministrationService {
    authorization_service: AuthorizationService,
    identity_service: IdentityService,
    assignments: Arc<dyn RoleAssignmentRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    audit_service: AuditService,
}

impl RoleAdministrationService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        identity_service: IdentityService,
        assignments: Arc<dyn RoleAssignmentRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        audit_service: AuditService,
    ) -> Self {
        Self {
            authorization_service,
            identity_service,
            assignments,
            organizations,
            audit_service,
        }
    }

    /// Grants a role, reactivating a dormant assignment of the same scope.
    pub async fn grant_role(
        &self,
        actor: &PrincipalContext,
        input: GrantRoleInput,
        metadata: &RequestMetadata,
    ) -> AppResult<RoleAssignment> {
        match input.organization_id {
            None => {
                self.authorization_service
                    .require(actor.principal_id(), Permission::ManageSystemUsers, None)
                    .await?;
            }
            Some(organization_id) => {
                self.authorization_service
                    .require(
                        actor.principal_id(),
                        Permission::ManageOrgUsers,
                        Some(organization_id),
                    )
                    .await?;
            }
        }

        if self
            .identity_service
            .find_by_id(input.principal_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "principal '{}' does not exist",
                input.principal_id
            )));
        }

        self.apply_grant(
            Some(actor.principal_id()),
            RoleGrant {
                principal_id: input.principal_id,
                role_kind: input.role_kind,
                organization_id: input.organization_id,
                permission_overrides: input.permission_overrides,
                expires_at: input.expires_at,
                granted_at: Utc::now(),
            },
            metadata,
        )
        .await
    }

    /// Soft-deactivates an assignment.
    ///
    /// With `expected_organization` set the assignment must belong to that
    /// organization and the actor needs `org.users.manage` there; otherwise
    /// the actor needs `system.users.manage`.
    pub async fn revoke_role(
        &self,
        actor: &PrincipalContext,
        assignment_id: RoleAssignmentId,
        expected_organization: Option<OrganizationId>,
        metadata: &RequestMetadata,
    ) -> AppResult<RoleAssignment> {
        let permission = if expected_organization.is_some() {
            Permission::ManageOrgUsers
        } else {
            Permission::ManageSystemUsers
        };
        self.authorization_service
            .require(actor.principal_id(), permission, expected_organization)
            .await?;

        let previous = self
            .assignments
            .find_assignment(assignment_id)
            .await?
            .filter(|assignment| {
                expected_organization.is_none()
                    || assignment.organization_id() == expected_organization
            })
            .ok_or_else(|| {
                AppError::NotFound(format!("role assignment '{assignment_id}' does not exist"))
            })?;

        let revoked = self.assignments.deactivate(assignment_id).await?;

        self.audit_service
            .record(
                AuditEvent::new(
                    AuditAction::RoleRevoked,
                    Some(actor.principal_id()),
                    revoked.organization_id(),
                    "role_assignment",
                    assignment_id.to_string(),
                )
                .with_values(
                    Some(assignment_snapshot(&previous)),
                    Some(assignment_snapshot(&revoked)),
                )
                .with_metadata(metadata),
            )
            .await?;

        Ok(revoked)
    }

    /// Lists every assignment of a principal. Principals may always list their own.
    pub async fn list_for_principal(
        &self,
        actor: &PrincipalContext,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        if actor.principal_id() != principal_id {
            self.authorization_service
                .require(actor.principal_id(), Permission::ManageSystemUsers, None)
                .await?;
        }

        self.assignments.list_for_principal(principal_id).await
    }

    /// Lists the assignments of an organization, active ones first.
    pub async fn list_members(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.authorization_service
            .require(
                actor.principal_id(),
                Permission::ManageOrgUsers,
                Some(organization_id),
            )
            .await?;

        let now = Utc::now();
        let mut members = self.assignments.list_for_organization(organization_id).await?;
        members.sort_by_key(|assignment| {
            (
                !assignment.is_effective_at(now),
                std::cmp::Reverse(assignment.role_kind()),
                assignment.assigned_at(),
            )
        });

        Ok(members)
    }

    /// Creates an active organization.
    pub async fn create_organization(
        &self,
        actor: &PrincipalContext,
        input: CreateOrganizationInput,
        metadata: &RequestMetadata,
    ) -> AppResult<Organization> {
        self.authorization_service
            .require(actor.principal_id(), Permission::ManageOrganizations, None)
            .await?;

        let organization = Organization::new(
            OrganizationSlug::new(input.slug)?,
            NonEmptyString::new(input.name)?,
            input.plan,
            Utc::now(),
        );
        self.organizations
            .create_organization(organization.clone())
            .await?;

        self.audit_service
            .record(
                AuditEvent::new(
                    AuditAction::OrganizationCreated,
                    Some(actor.principal_id()),
                    Some(organization.id),
                    "organization",
                    organization.id.to_string(),
                )
                .with_values(None, Some(organization_snapshot(&organization)))
                .with_metadata(metadata),
            )
            .await?;

        Ok(organization)
    }

    /// Activates or deactivates an organization.
    pub async fn set_organization_active(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
        is_active: bool,
        metadata: &RequestMetadata,
    ) -> AppResult<Organization> {
        self.authorization_service
            .require(actor.principal_id(), Permission::ManageOrganizations, None)
            .await?;

        let previous = self.require_organization(organization_id).await?;
        let updated = self
            .organizations
            .set_organization_active(organization_id, is_active)
            .await?;

        let action = if is_active {
            AuditAction::OrganizationActivated
        } else {
            AuditAction::OrganizationDeactivated
        };
        self.audit_service
            .record(
                AuditEvent::new(
                    action,
                    Some(actor.principal_id()),
                    Some(organization_id),
                    "organization",
                    organization_id.to_string(),
                )
                .with_values(
                    Some(organization_snapshot(&previous)),
                    Some(organization_snapshot(&updated)),
                )
                .with_metadata(metadata),
            )
            .await?;

        Ok(updated)
    }

    /// Lists every organization.
    pub async fn list_organizations(&self, actor: &PrincipalContext) -> AppResult<Vec<Organization>> {
        self.authorization_service
            .require(actor.principal_id(), Permission::ManageOrganizations, None)
            .await?;

        self.organizations.list_organizations().await
    }

    /// Reads one organization as a system operator or as one of its administrators.
    pub async fn find_organization(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
    ) -> AppResult<Organization> {
        let system_decision = self
            .authorization_service
            .authorize(actor.principal_id(), Permission::ManageOrganizations, None)
            .await?;
        if !system_decision.allowed {
            self.authorization_service
                .require(
                    actor.principal_id(),
                    Permission::ManageOrgSettings,
                    Some(organization_id),
                )
                .await?;
        }

        self.require_organization(organization_id).await
    }

    /// Summarizes an organization for its dashboard.
    pub async fn organization_overview(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
    ) -> AppResult<OrganizationOverview> {
        self.authorization_service
            .require(
                actor.principal_id(),
                Permission::ViewOrganizationDashboard,
                Some(organization_id),
            )
            .await?;

        let organization = self.require_organization(organization_id).await?;
        let now = Utc::now();
        let active_members = self
            .assignments
            .list_for_organization(organization_id)
            .await?
            .iter()
            .filter(|assignment| assignment.is_effective_at(now))
            .count();

        Ok(OrganizationOverview {
            organization,
            active_members,
        })
    }

    /// Ensures `principal_id` holds an effective system administrator role.
    ///
    /// Safe to call on every startup.
    pub async fn bootstrap_system_admin(&self, principal_id: PrincipalId) -> AppResult<RoleAssignment> {
        let now = Utc::now();
        let existing = self
            .assignments
            .list_for_principal(principal_id)
            .await?
            .into_iter()
            .find(|assignment| {
                assignment.role_kind() == RoleKind::SystemAdmin && assignment.is_effective_at(now)
            });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let grant = RoleGrant {
            principal_id,
            role_kind: RoleKind::SystemAdmin,
            organization_id: None,
            permission_overrides: BTreeSet::new(),
            expires_at: None,
            granted_at: now,
        };
        match self
            .apply_grant(None, grant, &RequestMetadata::default())
            .await
        {
            Err(AppError::AlreadyMember(_)) => self
                .assignments
                .list_for_principal(principal_id)
                .await?
                .into_iter()
                .find(|assignment| assignment.role_kind() == RoleKind::SystemAdmin)
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "system administrator assignment for '{principal_id}' vanished"
                    ))
                }),
            result => result,
        }
    }

    async fn apply_grant(
        &self,
        actor_id: Option<PrincipalId>,
        grant: RoleGrant,
        metadata: &RequestMetadata,
    ) -> AppResult<RoleAssignment> {
        if let Some(organization_id) = grant.organization_id {
            self.require_organization(organization_id).await?;
        }

        let outcome = self.assignments.grant(grant).await?;
        let (action, previous) = match &outcome {
            GrantOutcome::Created(_) => (AuditAction::RoleGranted, None),
            GrantOutcome::Reactivated { previous, .. } => {
                (AuditAction::RoleReactivated, Some(assignment_snapshot(previous)))
            }
        };
        let assignment = outcome.assignment().clone();

        self.audit_service
            .record(
                AuditEvent::new(
                    action,
                    actor_id,
                    assignment.organization_id(),
                    "role_assignment",
                    assignment.id().to_string(),
                )
                .with_values(previous, Some(assignment_snapshot(&assignment)))
                .with_metadata(metadata),
            )
            .await?;

        Ok(assignment)
    }

    async fn require_organization(&self, organization_id: OrganizationId) -> AppResult<Organization> {
        self.organizations
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("organization '{organization_id}' does not exist"))
            })
    }
}

fn assignment_snapshot(assignment: &RoleAssignment) -> serde_json::Value {
    json!({
        "principal_id": assignment.principal_id().to_string(),
        "role_kind": assignment.role_kind().as_str(),
        "organization_id": assignment.organization_id().map(|id| id.to_string()),
        "permission_overrides": assignment
            .permission_overrides()
            .iter()
            .map(|permission| permission.as_str())
            .collect::<Vec<_>>(),
        "is_active": assignment.is_active(),
        "expires_at": assignment.expires_at().map(|value| value.to_rfc3339()),
    })
}

fn organization_snapshot(organization: &Organization) -> serde_json::Value {
    json!({
        "slug": organization.slug.as_str(),
        "name": organization.name.as_str(),
        "plan": organization.plan.as_str(),
        "is_active": organization.is_active,
    })
}
