//! Invitation lifecycle: issue, view, accept and revoke.
//!
//! Raw tokens leave this module exactly once, in the issued result and the
//! invitation email; storage only ever sees their SHA-256 hash.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use warden_core::{AppError, AppResult, OrganizationId, PrincipalContext};
use warden_domain::{
    AuditAction, EmailAddress, Invitation, InvitationId, InvitationStatus, Organization,
    Permission, RoleAssignment, RoleKind,
};

use crate::{
    AuditEvent, AuditService, AuthorizationService, IdentityService, InvitationAcceptance,
    InvitationRepository, OrganizationRepository, RequestMetadata, RoleAssignmentRepository,
};

mod token_crypto;

use token_crypto::{generate_invitation_token, hash_invitation_token};

/// Port for sending emails. Infrastructure provides SMTP or console implementations.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a plain-text or HTML email.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()>;
}

/// Runtime settings for invitation issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationSettings {
    /// Base URL used to build `/invite/{token}` links.
    pub public_base_url: String,
    /// Lifetime of a freshly issued token.
    pub time_to_live: Duration,
}

/// Input payload for inviting an email address into an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteInput {
    /// Email address to invite.
    pub email: String,
    /// Target organization.
    pub organization_id: OrganizationId,
    /// Role granted on acceptance.
    pub role_kind: RoleKind,
}

/// Result of a successful invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvitation {
    /// Stored invitation.
    pub invitation: Invitation,
    /// Raw single-use token; never stored.
    pub raw_token: String,
    /// Link delivered to the invitee.
    pub invite_url: String,
    /// Whether an existing open invitation was re-issued.
    pub reissued: bool,
}

/// Public projection of an invitation for the token holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationView {
    /// Invitation identifier.
    pub invitation_id: InvitationId,
    /// Invited email address.
    pub email: String,
    /// Target organization.
    pub organization_id: OrganizationId,
    /// Target organization display name.
    pub organization_name: String,
    /// Role granted on acceptance.
    pub role_kind: RoleKind,
    /// Status as of the read, with lazy expiry applied.
    pub status: InvitationStatus,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Application service for invitations.
#[derive(Clone)]
pub struct InvitationService {
    authorization_service: AuthorizationService,
    identity_service: IdentityService,
    invitations: Arc<dyn InvitationRepository>,
    assignments: Arc<dyn RoleAssignmentRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    email_service: Arc<dyn EmailService>,
    audit_service: AuditService,
    settings: InvitationSettings,
}

impl InvitationService {
    /// Creates an invitation service.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        identity_service: IdentityService,
        invitations: Arc<dyn InvitationRepository>,
        assignments: Arc<dyn RoleAssignmentRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        email_service: Arc<dyn EmailService>,
        audit_service: AuditService,
        settings: InvitationSettings,
    ) -> Self {
        Self {
            authorization_service,
            identity_service,
            invitations,
            assignments,
            organizations,
            email_service,
            audit_service,
            settings,
        }
    }

    /// Issues an invitation, or re-issues the open one for the same pair.
    pub async fn invite(
        &self,
        actor: &PrincipalContext,
        input: InviteInput,
        metadata: &RequestMetadata,
    ) -> AppResult<IssuedInvitation> {
        self.authorization_service
            .require(
                actor.principal_id(),
                Permission::ManageOrgInvitations,
                Some(input.organization_id),
            )
            .await?;

        let email = EmailAddress::new(input.email)?;
        if input.role_kind == RoleKind::SystemAdmin {
            return Err(AppError::Validation(
                "system administrators cannot be invited".to_owned(),
            ));
        }

        let organization = self.active_organization(input.organization_id).await?;
        let now = Utc::now();

        self.ensure_not_member(&email, organization.id, now).await?;

        let open = self.invitations.find_open(&email, organization.id).await?;
        // Best-effort: concurrent invites can each pass this count.
        if open.is_none() {
            self.ensure_seat_available(&organization, now).await?;
        }

        let (raw_token, token_hash) = generate_invitation_token()?;

        let (invitation, previous) = match open {
            Some(mut invitation) => {
                let previous = invitation.clone();
                invitation.reissue(
                    input.role_kind,
                    actor.principal_id(),
                    token_hash,
                    now,
                    self.settings.time_to_live,
                )?;
                (invitation, Some(previous))
            }
            None => (
                Invitation::new(
                    email,
                    organization.id,
                    input.role_kind,
                    actor.principal_id(),
                    token_hash,
                    now,
                    self.settings.time_to_live,
                )?,
                None,
            ),
        };

        self.invitations.save_open(&invitation).await?;

        let reissued = previous.is_some();
        let action = if reissued {
            AuditAction::InvitationReissued
        } else {
            AuditAction::InvitationCreated
        };
        self.audit_service
            .record(
                AuditEvent::new(
                    action,
                    Some(actor.principal_id()),
                    Some(organization.id),
                    "invitation",
                    invitation.id.to_string(),
                )
                .with_values(
                    previous.as_ref().map(invitation_snapshot),
                    Some(invitation_snapshot(&invitation)),
                )
                .with_metadata(metadata),
            )
            .await?;

        let invite_url = format!(
            "{}/invite/{raw_token}",
            self.settings.public_base_url.trim_end_matches('/')
        );
        self.send_invitation_email(&invitation, &organization, &invite_url)
            .await?;

        Ok(IssuedInvitation {
            invitation,
            raw_token,
            invite_url,
            reissued,
        })
    }

    /// Looks up an invitation by its raw token.
    pub async fn view(&self, raw_token: &str) -> AppResult<InvitationView> {
        let invitation = self
            .invitations
            .find_by_token_hash(&hash_invitation_token(raw_token))
            .await?
            .ok_or_else(|| AppError::NotFound("invitation does not exist".to_owned()))?;

        let organization_name = self
            .organizations
            .find_organization(invitation.organization_id)
            .await?
            .map(|organization| organization.name.as_str().to_owned())
            .unwrap_or_default();

        Ok(InvitationView {
            invitation_id: invitation.id,
            email: invitation.email.as_str().to_owned(),
            organization_id: invitation.organization_id,
            organization_name,
            role_kind: invitation.role_kind,
            status: invitation.effective_status(Utc::now()),
            expires_at: invitation.expires_at,
        })
    }

    /// Accepts an invitation on behalf of the authenticated principal.
    pub async fn accept(
        &self,
        raw_token: &str,
        principal: &PrincipalContext,
        metadata: &RequestMetadata,
    ) -> AppResult<RoleAssignment> {
        let token_hash = hash_invitation_token(raw_token);
        let invitation = self
            .invitations
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invitation token is invalid".to_owned()))?;

        let now = Utc::now();
        invitation.ensure_acceptable(now)?;

        if !invitation.email.as_str().eq_ignore_ascii_case(principal.email()) {
            return Err(AppError::Forbidden(format!(
                "invitation '{}' was issued to a different email address",
                invitation.id
            )));
        }

        self.active_organization(invitation.organization_id).await?;

        let outcome = self
            .invitations
            .complete_acceptance(InvitationAcceptance {
                invitation_id: invitation.id,
                token_hash,
                principal_id: principal.principal_id(),
                accepted_at: now,
            })
            .await?;

        let assignment = outcome.grant.assignment().clone();
        self.audit_service
            .record(
                AuditEvent::new(
                    AuditAction::InvitationAccepted,
                    Some(principal.principal_id()),
                    Some(invitation.organization_id),
                    "invitation",
                    invitation.id.to_string(),
                )
                .with_values(
                    Some(invitation_snapshot(&invitation)),
                    Some(json!({
                        "invitation": invitation_snapshot(&outcome.invitation),
                        "assignment_id": assignment.id().to_string(),
                        "role_kind": assignment.role_kind().as_str(),
                    })),
                )
                .with_metadata(metadata),
            )
            .await?;

        Ok(assignment)
    }

    /// Revokes an open invitation of an organization.
    pub async fn revoke(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
        invitation_id: InvitationId,
        metadata: &RequestMetadata,
    ) -> AppResult<Invitation> {
        self.authorization_service
            .require(
                actor.principal_id(),
                Permission::ManageOrgInvitations,
                Some(organization_id),
            )
            .await?;

        let previous = self
            .invitations
            .find_invitation(invitation_id)
            .await?
            .filter(|invitation| invitation.organization_id == organization_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("invitation '{invitation_id}' does not exist"))
            })?;

        let revoked = self.invitations.revoke(invitation_id, Utc::now()).await?;

        self.audit_service
            .record(
                AuditEvent::new(
                    AuditAction::InvitationRevoked,
                    Some(actor.principal_id()),
                    Some(organization_id),
                    "invitation",
                    invitation_id.to_string(),
                )
                .with_values(
                    Some(invitation_snapshot(&previous)),
                    Some(invitation_snapshot(&revoked)),
                )
                .with_metadata(metadata),
            )
            .await?;

        Ok(revoked)
    }

    /// Lists invitations of an organization with lazily computed statuses.
    pub async fn list_for_organization(
        &self,
        actor: &PrincipalContext,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Invitation>> {
        self.authorization_service
            .require(
                actor.principal_id(),
                Permission::ManageOrgInvitations,
                Some(organization_id),
            )
            .await?;

        let now = Utc::now();
        let mut invitations = self
            .invitations
            .list_for_organization(organization_id)
            .await?;
        for invitation in &mut invitations {
            invitation.status = invitation.effective_status(now);
        }

        Ok(invitations)
    }

    async fn active_organization(&self, organization_id: OrganizationId) -> AppResult<Organization> {
        let organization = self
            .organizations
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("organization '{organization_id}' does not exist"))
            })?;

        if !organization.is_active {
            return Err(AppError::Forbidden(format!(
                "organization '{organization_id}' is deactivated"
            )));
        }

        Ok(organization)
    }

    async fn ensure_not_member(
        &self,
        email: &EmailAddress,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(principal) = self.identity_service.find_by_email(email).await? else {
            return Ok(());
        };

        let is_member = self
            .assignments
            .list_for_principal(principal.id)
            .await?
            .iter()
            .any(|assignment| {
                assignment.organization_id() == Some(organization_id)
                    && assignment.is_effective_at(now)
            });

        if is_member {
            return Err(AppError::AlreadyMember(format!(
                "'{email}' already belongs to organization '{organization_id}'"
            )));
        }

        Ok(())
    }

    async fn ensure_seat_available(
        &self,
        organization: &Organization,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let members: BTreeSet<_> = self
            .assignments
            .list_for_organization(organization.id)
            .await?
            .iter()
            .filter(|assignment| assignment.is_effective_at(now))
            .map(RoleAssignment::principal_id)
            .collect();

        let pending = self
            .invitations
            .list_for_organization(organization.id)
            .await?
            .iter()
            .filter(|invitation| invitation.effective_status(now) == InvitationStatus::Pending)
            .count();

        let limits = organization.plan.limits();
        if !limits.allows_users(members.len() + pending + 1) {
            return Err(AppError::Conflict(format!(
                "organization '{}' reached the {} plan limit of {} users",
                organization.slug.as_str(),
                organization.plan.as_str(),
                limits.max_users
            )));
        }

        Ok(())
    }

    async fn send_invitation_email(
        &self,
        invitation: &Invitation,
        organization: &Organization,
        invite_url: &str,
    ) -> AppResult<()> {
        let organization_name = organization.name.as_str();
        let subject = format!("You have been invited to {organization_name}");
        let text_body = format!(
            "You have been invited to join {organization_name} as {}.\n\n\
             Open the link below to accept the invitation:\n{invite_url}\n\n\
             This link expires on {}.",
            invitation.role_kind.as_str(),
            invitation.expires_at.to_rfc3339()
        );

        self.email_service
            .send_email(invitation.email.as_str(), &subject, &text_body, None)
            .await
    }
}

fn invitation_snapshot(invitation: &Invitation) -> serde_json::Value {
    json!({
        "email": invitation.email.as_str(),
        "role_kind": invitation.role_kind.as_str(),
        "status": invitation.status.as_str(),
        "expires_at": invitation.expires_at.to_rfc3339(),
        "invited_by": invitation.invited_by.to_string(),
    })
}

#[cfg(test)]
mod tests;
