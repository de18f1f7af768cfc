use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use warden_core::{AppError, AppResult, NonEmptyString, OrganizationId, PrincipalContext, PrincipalId};
use warden_domain::{
    EmailAddress, Invitation, InvitationId, Organization, OrganizationSlug, Principal,
    RoleAssignment, RoleAssignmentId, RoleKind, SubscriptionPlan,
};

use crate::{
    AcceptanceOutcome, AuditEvent, AuditLogQuery, AuditLogRepository, AuditRepository,
    AuditService, AuthorizationService, EmailService, GrantOutcome, IdentityProvider,
    IdentityService, InvitationAcceptance, InvitationRepository, InvitationService,
    InvitationSettings, OrganizationRepository, RoleAdministrationService,
    RoleAssignmentRepository, RoleGrant, RouteGuard, resolve_acceptance, resolve_grant,
};

#[derive(Default)]
struct StoreState {
    organizations: Vec<Organization>,
    assignments: Vec<RoleAssignment>,
    invitations: Vec<Invitation>,
    unavailable: bool,
}

#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub(crate) async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub(crate) async fn assignments(&self) -> Vec<RoleAssignment> {
        self.state.lock().await.assignments.clone()
    }

    pub(crate) async fn invitations(&self) -> Vec<Invitation> {
        self.state.lock().await.invitations.clone()
    }

    pub(crate) async fn replace_invitation(&self, invitation: Invitation) {
        let mut state = self.state.lock().await;
        state.invitations.retain(|stored| stored.id != invitation.id);
        state.invitations.push(invitation);
    }
}

fn ensure_available(state: &StoreState) -> AppResult<()> {
    if state.unavailable {
        return Err(AppError::Unavailable("store offline".to_owned()));
    }
    Ok(())
}

fn store_assignment(state: &mut StoreState, assignment: &RoleAssignment) {
    state
        .assignments
        .retain(|stored| stored.id() != assignment.id());
    state.assignments.push(assignment.clone());
}

#[async_trait]
impl RoleAssignmentRepository for FakeStore {
    async fn list_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| assignment.principal_id() == principal_id)
            .cloned()
            .collect())
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| assignment.organization_id() == Some(organization_id))
            .cloned()
            .collect())
    }

    async fn find_assignment(&self, id: RoleAssignmentId) -> AppResult<Option<RoleAssignment>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .assignments
            .iter()
            .find(|assignment| assignment.id() == id)
            .cloned())
    }

    async fn grant(&self, grant: RoleGrant) -> AppResult<GrantOutcome> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        let existing = state
            .assignments
            .iter()
            .find(|assignment| {
                assignment.principal_id() == grant.principal_id
                    && assignment.organization_id() == grant.organization_id
            })
            .cloned();
        let outcome = resolve_grant(existing, &grant)?;
        store_assignment(&mut state, outcome.assignment());
        Ok(outcome)
    }

    async fn deactivate(&self, id: RoleAssignmentId) -> AppResult<RoleAssignment> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        let Some(mut assignment) = state
            .assignments
            .iter()
            .find(|assignment| assignment.id() == id)
            .cloned()
        else {
            return Err(AppError::NotFound(format!("role assignment '{id}' does not exist")));
        };
        assignment.deactivate()?;
        store_assignment(&mut state, &assignment);
        Ok(assignment)
    }
}

#[async_trait]
impl OrganizationRepository for FakeStore {
    async fn find_organization(&self, id: OrganizationId) -> AppResult<Option<Organization>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .organizations
            .iter()
            .find(|organization| organization.id == id)
            .cloned())
    }

    async fn find_organizations(&self, ids: &[OrganizationId]) -> AppResult<Vec<Organization>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .organizations
            .iter()
            .filter(|organization| ids.contains(&organization.id))
            .cloned()
            .collect())
    }

    async fn list_organizations(&self) -> AppResult<Vec<Organization>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state.organizations.clone())
    }

    async fn create_organization(&self, organization: Organization) -> AppResult<()> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        if state
            .organizations
            .iter()
            .any(|stored| stored.slug == organization.slug)
        {
            return Err(AppError::Conflict(format!(
                "organization slug '{}' is taken",
                organization.slug.as_str()
            )));
        }
        state.organizations.push(organization);
        Ok(())
    }

    async fn set_organization_active(
        &self,
        id: OrganizationId,
        is_active: bool,
    ) -> AppResult<Organization> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        let organization = state
            .organizations
            .iter_mut()
            .find(|organization| organization.id == id)
            .ok_or_else(|| AppError::NotFound(format!("organization '{id}' does not exist")))?;
        organization.is_active = is_active;
        Ok(organization.clone())
    }
}

#[async_trait]
impl InvitationRepository for FakeStore {
    async fn find_invitation(&self, id: InvitationId) -> AppResult<Option<Invitation>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .invitations
            .iter()
            .find(|invitation| invitation.id == id)
            .cloned())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Invitation>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .invitations
            .iter()
            .find(|invitation| invitation.token_hash == token_hash)
            .cloned())
    }

    async fn find_open(
        &self,
        email: &EmailAddress,
        organization_id: OrganizationId,
    ) -> AppResult<Option<Invitation>> {
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .invitations
            .iter()
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
        let state = self.state.lock().await;
        ensure_available(&state)?;
        Ok(state
            .invitations
            .iter()
            .filter(|invitation| invitation.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn save_open(&self, invitation: &Invitation) -> AppResult<()> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        if let Some(stored) = state
            .invitations
            .iter_mut()
            .find(|stored| stored.id == invitation.id)
        {
            if !stored.is_open() {
                return Err(AppError::InvitationAlreadyProcessed(format!(
                    "invitation '{}' is no longer open",
                    invitation.id
                )));
            }
            *stored = invitation.clone();
            return Ok(());
        }

        if state.invitations.iter().any(|stored| {
            stored.is_open()
                && stored.email == invitation.email
                && stored.organization_id == invitation.organization_id
        }) {
            return Err(AppError::Conflict("open invitation already exists".to_owned()));
        }
        state.invitations.push(invitation.clone());
        Ok(())
    }

    async fn revoke(&self, id: InvitationId, revoked_at: DateTime<Utc>) -> AppResult<Invitation> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        let invitation = state
            .invitations
            .iter_mut()
            .find(|invitation| invitation.id == id)
            .ok_or_else(|| AppError::NotFound(format!("invitation '{id}' does not exist")))?;
        invitation.revoke(revoked_at)?;
        Ok(invitation.clone())
    }

    async fn complete_acceptance(
        &self,
        acceptance: InvitationAcceptance,
    ) -> AppResult<AcceptanceOutcome> {
        let mut state = self.state.lock().await;
        ensure_available(&state)?;
        let invitation = state
            .invitations
            .iter()
            .find(|invitation| invitation.id == acceptance.invitation_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("invitation does not exist".to_owned()))?;
        let existing = state
            .assignments
            .iter()
            .find(|assignment| {
                assignment.principal_id() == acceptance.principal_id
                    && assignment.organization_id() == Some(invitation.organization_id)
            })
            .cloned();

        let outcome = resolve_acceptance(invitation, existing, &acceptance)?;
        store_assignment(&mut state, outcome.grant.assignment());
        state
            .invitations
            .retain(|stored| stored.id != outcome.invitation.id);
        state.invitations.push(outcome.invitation.clone());
        Ok(outcome)
    }
}

#[derive(Default)]
pub(crate) struct FakeIdentityProvider {
    sessions: Mutex<HashMap<String, Principal>>,
    unavailable: Mutex<bool>,
}

impl FakeIdentityProvider {
    pub(crate) async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().await = unavailable;
    }

    async fn ensure_available(&self) -> AppResult<()> {
        if *self.unavailable.lock().await {
            return Err(AppError::Unavailable("identity provider offline".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn find_by_session_token(&self, session_token: &str) -> AppResult<Option<Principal>> {
        self.ensure_available().await?;
        Ok(self.sessions.lock().await.get(session_token).cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> AppResult<Option<Principal>> {
        self.ensure_available().await?;
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .find(|principal| &principal.email == email)
            .cloned())
    }

    async fn find_by_id(&self, principal_id: PrincipalId) -> AppResult<Option<Principal>> {
        self.ensure_available().await?;
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .find(|principal| principal.id == principal_id)
            .cloned())
    }
}

#[derive(Default)]
pub(crate) struct FakeEmailService {
    pub(crate) sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl FakeEmailService {
    pub(crate) async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }
}

#[async_trait]
impl EmailService for FakeEmailService {
    async fn send_email(
        &self,
        to: &str,
        _subject: &str,
        text_body: &str,
        _html_body: Option<&str>,
    ) -> AppResult<()> {
        if *self.failing.lock().await {
            return Err(AppError::Unavailable("email relay offline".to_owned()));
        }
        self.sent
            .lock()
            .await
            .push((to.to_owned(), text_body.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditSink {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
    failing: Mutex<bool>,
}

impl FakeAuditSink {
    pub(crate) async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }
}

#[async_trait]
impl AuditRepository for FakeAuditSink {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        if *self.failing.lock().await {
            return Err(AppError::Unavailable("audit sink offline".to_owned()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for FakeAuditSink {
    async fn list_events(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEvent>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .rev()
            .filter(|event| query.action.is_none_or(|action| event.action == action))
            .filter(|event| query.actor_id.is_none_or(|actor| event.actor_id == Some(actor)))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}

/// Fully wired application services over in-process fakes.
pub(crate) struct Harness {
    pub(crate) store: Arc<FakeStore>,
    pub(crate) identity: Arc<FakeIdentityProvider>,
    pub(crate) email: Arc<FakeEmailService>,
    pub(crate) primary_audit: Arc<FakeAuditSink>,
    pub(crate) fallback_audit: Arc<FakeAuditSink>,
    pub(crate) authorization: AuthorizationService,
    pub(crate) audit: AuditService,
    pub(crate) invitations: InvitationService,
    pub(crate) admin: RoleAdministrationService,
    pub(crate) guard: RouteGuard,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_sample_rate(1.0)
    }

    pub(crate) fn with_sample_rate(allowed_sample_rate: f64) -> Self {
        let store = Arc::new(FakeStore::default());
        let identity = Arc::new(FakeIdentityProvider::default());
        let email = Arc::new(FakeEmailService::default());
        let primary_audit = Arc::new(FakeAuditSink::default());
        let fallback_audit = Arc::new(FakeAuditSink::default());

        let identity_service = IdentityService::new(identity.clone());
        let authorization = AuthorizationService::new(store.clone(), store.clone());
        let audit = AuditService::new(
            primary_audit.clone(),
            fallback_audit.clone(),
            primary_audit.clone(),
            allowed_sample_rate,
        );
        let invitations = InvitationService::new(
            authorization.clone(),
            identity_service.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            email.clone(),
            audit.clone(),
            InvitationSettings {
                public_base_url: "https://warden.test/".to_owned(),
                time_to_live: Duration::hours(72),
            },
        );
        let admin = RoleAdministrationService::new(
            authorization.clone(),
            identity_service.clone(),
            store.clone(),
            store.clone(),
            audit.clone(),
        );
        let guard = RouteGuard::new(identity_service, authorization.clone(), audit.clone());

        Self {
            store,
            identity,
            email,
            primary_audit,
            fallback_audit,
            authorization,
            audit,
            invitations,
            admin,
            guard,
        }
    }

    /// Registers a principal reachable through `session_token`.
    pub(crate) async fn principal(&self, email: &str, session_token: &str) -> Principal {
        let Ok(email) = EmailAddress::new(email) else {
            panic!("fixture email should be valid");
        };
        let principal = Principal {
            id: PrincipalId::new(),
            email,
            is_active: true,
        };
        self.identity
            .sessions
            .lock()
            .await
            .insert(session_token.to_owned(), principal.clone());
        principal
    }

    pub(crate) async fn organization(&self, slug: &str, plan: SubscriptionPlan) -> Organization {
        let (Ok(slug), Ok(name)) = (OrganizationSlug::new(slug), NonEmptyString::new(slug)) else {
            panic!("fixture organization should be valid");
        };
        let organization = Organization::new(slug, name, plan, Utc::now());
        let Ok(()) = self
            .store
            .create_organization(organization.clone())
            .await
        else {
            panic!("fixture organization should be stored");
        };
        organization
    }

    /// Grants a role directly through the store, bypassing actor checks.
    pub(crate) async fn grant(
        &self,
        principal: &Principal,
        role_kind: RoleKind,
        organization_id: Option<OrganizationId>,
    ) -> RoleAssignment {
        let Ok(outcome) = self
            .store
            .grant(RoleGrant {
                principal_id: principal.id,
                role_kind,
                organization_id,
                permission_overrides: BTreeSet::new(),
                expires_at: None,
                granted_at: Utc::now(),
            })
            .await
        else {
            panic!("fixture grant should succeed");
        };
        outcome.assignment().clone()
    }
}

pub(crate) fn context(principal: &Principal) -> PrincipalContext {
    PrincipalContext::new(principal.id, principal.email.as_str(), None)
}
