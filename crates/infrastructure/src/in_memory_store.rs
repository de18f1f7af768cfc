use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use warden_application::{
    AcceptanceOutcome, AuditEvent, AuditLogQuery, AuditLogRepository, AuditRepository,
    GrantOutcome, InvitationAcceptance, InvitationRepository, OrganizationRepository,
    RoleAssignmentRepository, RoleGrant, resolve_acceptance, resolve_grant,
};
use warden_core::{AppError, AppResult, OrganizationId, PrincipalId};
use warden_domain::{
    EmailAddress, Invitation, InvitationId, Organization, RoleAssignment, RoleAssignmentId,
};

#[derive(Debug, Default)]
struct StoreTables {
    organizations: HashMap<OrganizationId, Organization>,
    assignments: HashMap<RoleAssignmentId, RoleAssignment>,
    invitations: HashMap<InvitationId, Invitation>,
    audit_events: Vec<AuditEvent>,
}

impl StoreTables {
    fn scope_assignment(
        &self,
        principal_id: PrincipalId,
        organization_id: Option<OrganizationId>,
    ) -> Option<RoleAssignment> {
        self.assignments
            .values()
            .find(|assignment| {
                assignment.principal_id() == principal_id
                    && assignment.organization_id() == organization_id
            })
            .cloned()
    }

    fn store_assignment(&mut self, assignment: &RoleAssignment) {
        self.assignments
            .insert(assignment.id(), assignment.clone());
    }
}

/// In-memory implementation of every storage port.
///
/// All tables sit behind one lock, so multi-table operations such as
/// invitation acceptance run under a single write guard.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<StoreTables>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryStore {
    async fn list_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments: Vec<RoleAssignment> = self
            .tables
            .read()
            .await
            .assignments
            .values()
            .filter(|assignment| assignment.principal_id() == principal_id)
            .cloned()
            .collect();
        assignments.sort_by_key(RoleAssignment::assigned_at);
        Ok(assignments)
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments: Vec<RoleAssignment> = self
            .tables
            .read()
            .await
            .assignments
            .values()
            .filter(|assignment| assignment.organization_id() == Some(organization_id))
            .cloned()
            .collect();
        assignments.sort_by_key(RoleAssignment::assigned_at);
        Ok(assignments)
    }

    async fn find_assignment(&self, id: RoleAssignmentId) -> AppResult<Option<RoleAssignment>> {
        Ok(self.tables.read().await.assignments.get(&id).cloned())
    }

    async fn grant(&self, grant: RoleGrant) -> AppResult<GrantOutcome> {
        let mut tables = self.tables.write().await;
        let existing = tables.scope_assignment(grant.principal_id, grant.organization_id);
        let outcome = resolve_grant(existing, &grant)?;
        tables.store_assignment(outcome.assignment());
        Ok(outcome)
    }

    async fn deactivate(&self, id: RoleAssignmentId) -> AppResult<RoleAssignment> {
        let mut tables = self.tables.write().await;
        let assignment = tables
            .assignments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("role assignment '{id}' does not exist")))?;
        assignment.deactivate()?;
        Ok(assignment.clone())
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryStore {
    async fn find_organization(&self, id: OrganizationId) -> AppResult<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(&id).cloned())
    }

    async fn find_organizations(&self, ids: &[OrganizationId]) -> AppResult<Vec<Organization>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.organizations.get(id).cloned())
            .collect())
    }

    async fn list_organizations(&self) -> AppResult<Vec<Organization>> {
        let mut organizations: Vec<Organization> = self
            .tables
            .read()
            .await
            .organizations
            .values()
            .cloned()
            .collect();
        organizations.sort_by(|left, right| left.slug.as_str().cmp(right.slug.as_str()));
        Ok(organizations)
    }

    async fn create_organization(&self, organization: Organization) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .organizations
            .values()
            .any(|stored| stored.slug == organization.slug)
        {
            return Err(AppError::Conflict(format!(
                "organization slug '{}' is already taken",
                organization.slug.as_str()
            )));
        }

        tables.organizations.insert(organization.id, organization);
        Ok(())
    }

    async fn set_organization_active(
        &self,
        id: OrganizationId,
        is_active: bool,
    ) -> AppResult<Organization> {
        let mut tables = self.tables.write().await;
        let organization = tables
            .organizations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("organization '{id}' does not exist")))?;
        organization.is_active = is_active;
        Ok(organization.clone())
    }
}

#[async_trait]
impl InvitationRepository for InMemoryStore {
    async fn find_invitation(&self, id: InvitationId) -> AppResult<Option<Invitation>> {
        Ok(self.tables.read().await.invitations.get(&id).cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Invitation>> {
        Ok(self
            .tables
            .read()
            .await
            .invitations
            .values()
            .find(|invitation| invitation.token_hash == token_hash)
            .cloned())
    }

    async fn find_open(
        &self,
        email: &EmailAddress,
        organization_id: OrganizationId,
    ) -> AppResult<Option<Invitation>> {
        Ok(self
            .tables
            .read()
            .await
            .invitations
            .values()
            .find(|invitation| {
                invitation.is_open()
                    && &invitation.email == email
                    && invitation.organization_id == organization_id
            })
            .cloned())
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Invitation>> {
        let mut invitations: Vec<Invitation> = self
            .tables
            .read()
            .await
            .invitations
            .values()
            .filter(|invitation| invitation.organization_id == organization_id)
            .cloned()
            .collect();
        invitations.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(invitations)
    }

    async fn save_open(&self, invitation: &Invitation) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        if let Some(stored) = tables.invitations.get(&invitation.id) {
            if !stored.is_open() {
                return Err(AppError::InvitationAlreadyProcessed(format!(
                    "invitation '{}' is already {}",
                    invitation.id,
                    stored.status.as_str()
                )));
            }
        } else if tables.invitations.values().any(|stored| {
            stored.is_open()
                && stored.email == invitation.email
                && stored.organization_id == invitation.organization_id
        }) {
            return Err(AppError::Conflict(format!(
                "an open invitation for '{}' already exists",
                invitation.email
            )));
        }

        tables
            .invitations
            .insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn revoke(&self, id: InvitationId, revoked_at: DateTime<Utc>) -> AppResult<Invitation> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("invitation '{id}' does not exist")))?;
        invitation.revoke(revoked_at)?;
        Ok(invitation.clone())
    }

    async fn complete_acceptance(
        &self,
        acceptance: InvitationAcceptance,
    ) -> AppResult<AcceptanceOutcome> {
        let mut tables = self.tables.write().await;
        let invitation = tables
            .invitations
            .get(&acceptance.invitation_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "invitation '{}' does not exist",
                    acceptance.invitation_id
                ))
            })?;
        let existing =
            tables.scope_assignment(acceptance.principal_id, Some(invitation.organization_id));

        let outcome = resolve_acceptance(invitation, existing, &acceptance)?;
        tables.store_assignment(outcome.grant.assignment());
        tables
            .invitations
            .insert(outcome.invitation.id, outcome.invitation.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.tables.write().await.audit_events.push(event);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryStore {
    async fn list_events(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEvent>> {
        Ok(self
            .tables
            .read()
            .await
            .audit_events
            .iter()
            .rev()
            .filter(|event| query.action.is_none_or(|action| event.action == action))
            .filter(|event| query.actor_id.is_none_or(|actor| event.actor_id == Some(actor)))
            .filter(|event| {
                query
                    .organization_id
                    .is_none_or(|organization| event.organization_id == Some(organization))
            })
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}
