use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::{AppResult, OrganizationId, PrincipalId};
use warden_domain::{
    EmailAddress, Invitation, InvitationId, Organization, Permission, RoleAssignment,
    RoleAssignmentId, RoleKind,
};

/// Request to hold `role_kind` in a scope, used by grants and invitation acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    /// Principal receiving the role.
    pub principal_id: PrincipalId,
    /// Role kind to hold.
    pub role_kind: RoleKind,
    /// Organization scope; `None` for system-wide roles.
    pub organization_id: Option<OrganizationId>,
    /// Extra permissions on top of the role defaults.
    pub permission_overrides: BTreeSet<Permission>,
    /// Optional expiry of the grant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Grant timestamp.
    pub granted_at: DateTime<Utc>,
}

/// Result of applying a [`RoleGrant`] to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// A new assignment row was inserted.
    Created(RoleAssignment),
    /// A dormant assignment was reactivated in place.
    Reactivated {
        /// Snapshot before reactivation.
        previous: RoleAssignment,
        /// Snapshot after reactivation.
        current: RoleAssignment,
    },
}

impl GrantOutcome {
    /// Returns the assignment as stored after the grant.
    #[must_use]
    pub fn assignment(&self) -> &RoleAssignment {
        match self {
            Self::Created(assignment) => assignment,
            Self::Reactivated { current, .. } => current,
        }
    }
}

/// Decides how a grant lands on the (at most one) existing row for its scope.
///
/// Store adapters call this while holding their write lock or transaction so
/// that the read and the write are one atomic unit.
pub fn resolve_grant(
    existing: Option<RoleAssignment>,
    grant: &RoleGrant,
) -> AppResult<GrantOutcome> {
    match existing {
        Some(previous) => {
            let mut current = previous.clone();
            current.reactivate(
                grant.role_kind,
                grant.permission_overrides.clone(),
                grant.granted_at,
                grant.expires_at,
            )?;
            Ok(GrantOutcome::Reactivated { previous, current })
        }
        None => RoleAssignment::new(
            grant.principal_id,
            grant.role_kind,
            grant.organization_id,
            grant.permission_overrides.clone(),
            grant.granted_at,
            grant.expires_at,
        )
        .map(GrantOutcome::Created),
    }
}

/// Repository port for role assignments.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Lists every assignment held by a principal, including inactive ones.
    async fn list_for_principal(&self, principal_id: PrincipalId)
    -> AppResult<Vec<RoleAssignment>>;

    /// Lists every assignment scoped to an organization.
    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Finds one assignment by id.
    async fn find_assignment(&self, id: RoleAssignmentId) -> AppResult<Option<RoleAssignment>>;

    /// Atomically inserts or reactivates the assignment for the grant's scope.
    async fn grant(&self, grant: RoleGrant) -> AppResult<GrantOutcome>;

    /// Atomically soft-deactivates an assignment and returns the stored result.
    async fn deactivate(&self, id: RoleAssignmentId) -> AppResult<RoleAssignment>;
}

/// Repository port for organizations.
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Finds one organization.
    async fn find_organization(&self, id: OrganizationId) -> AppResult<Option<Organization>>;

    /// Loads the organizations with the given ids; unknown ids are skipped.
    async fn find_organizations(&self, ids: &[OrganizationId]) -> AppResult<Vec<Organization>>;

    /// Lists all organizations ordered by slug.
    async fn list_organizations(&self) -> AppResult<Vec<Organization>>;

    /// Persists a new organization; slug collisions are conflicts.
    async fn create_organization(&self, organization: Organization) -> AppResult<()>;

    /// Flips the active flag and returns the stored organization.
    async fn set_organization_active(
        &self,
        id: OrganizationId,
        is_active: bool,
    ) -> AppResult<Organization>;
}

/// Atomic acceptance request for one invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationAcceptance {
    /// Invitation being accepted.
    pub invitation_id: InvitationId,
    /// Hash of the presented token; must still match the stored one.
    pub token_hash: String,
    /// Accepting principal.
    pub principal_id: PrincipalId,
    /// Acceptance instant.
    pub accepted_at: DateTime<Utc>,
}

/// Stored result of an acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceOutcome {
    /// Invitation after the transition to `accepted`.
    pub invitation: Invitation,
    /// Assignment created or reactivated for the principal.
    pub grant: GrantOutcome,
}

/// Applies an acceptance to loaded state without writing anything.
///
/// Adapters persist both results together or neither.
pub fn resolve_acceptance(
    mut invitation: Invitation,
    existing_assignment: Option<RoleAssignment>,
    acceptance: &InvitationAcceptance,
) -> AppResult<AcceptanceOutcome> {
    if invitation.token_hash != acceptance.token_hash {
        return Err(warden_core::AppError::InvitationAlreadyProcessed(format!(
            "invitation '{}' was re-issued with a new token",
            invitation.id
        )));
    }

    invitation.ensure_acceptable(acceptance.accepted_at)?;

    let grant = resolve_grant(
        existing_assignment,
        &RoleGrant {
            principal_id: acceptance.principal_id,
            role_kind: invitation.role_kind,
            organization_id: Some(invitation.organization_id),
            permission_overrides: BTreeSet::new(),
            expires_at: None,
            granted_at: acceptance.accepted_at,
        },
    )?;

    invitation.accept(acceptance.principal_id, acceptance.accepted_at)?;

    Ok(AcceptanceOutcome { invitation, grant })
}

/// Repository port for invitations.
#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// Finds one invitation by id.
    async fn find_invitation(&self, id: InvitationId) -> AppResult<Option<Invitation>>;

    /// Finds the invitation currently holding a token hash.
    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Invitation>>;

    /// Finds the non-terminal invitation for an (email, organization) pair.
    async fn find_open(
        &self,
        email: &EmailAddress,
        organization_id: OrganizationId,
    ) -> AppResult<Option<Invitation>>;

    /// Lists invitations of an organization, newest first.
    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Invitation>>;

    /// Inserts a new open invitation or updates the open row with the same id.
    ///
    /// Fails with `Conflict` when another open row exists for the pair and with
    /// `InvitationAlreadyProcessed` when the stored row became terminal.
    async fn save_open(&self, invitation: &Invitation) -> AppResult<()>;

    /// Transitions an open invitation to `revoked`.
    async fn revoke(&self, id: InvitationId, revoked_at: DateTime<Utc>) -> AppResult<Invitation>;

    /// Accepts an invitation and grants its role in one atomic unit.
    async fn complete_acceptance(
        &self,
        acceptance: InvitationAcceptance,
    ) -> AppResult<AcceptanceOutcome>;
}
