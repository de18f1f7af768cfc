//! Invitation lifecycle state machine.
//!
//! ```text
//! pending --accept--> accepted*
//! pending --expires_at passes--> expired      (computed on read)
//! pending|expired --re-invite--> pending      (same row, new token/expiry)
//! pending|expired --revoke--> revoked*
//! ```

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult, OrganizationId, PrincipalId, uuid_identifier};

use crate::{EmailAddress, RoleKind};

uuid_identifier!(
    /// Invitation identifier; stable across re-issues.
    InvitationId
);

/// Invitation status. `Accepted` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    /// Awaiting acceptance.
    Pending,
    /// Converted into a role assignment.
    Accepted,
    /// Past its expiry without being acted on.
    Expired,
    /// Withdrawn by an administrator.
    Revoked,
}

impl InvitationStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Revoked)
    }
}

impl FromStr for InvitationStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            _ => Err(AppError::Validation(format!(
                "unknown invitation status '{value}'"
            ))),
        }
    }
}

/// Offer to grant an organization role to an email address.
///
/// Only the SHA-256 hash of the single-use token is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Invitation identifier.
    pub id: InvitationId,
    /// Invited email address.
    pub email: EmailAddress,
    /// Target organization.
    pub organization_id: OrganizationId,
    /// Role granted on acceptance.
    pub role_kind: RoleKind,
    /// Principal who issued (or last re-issued) the invitation.
    pub invited_by: PrincipalId,
    /// Hex SHA-256 of the raw token.
    pub token_hash: String,
    /// Stored status; see [`Invitation::effective_status`].
    pub status: InvitationStatus,
    /// Expiry of the current token.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
    /// Acceptance timestamp.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Principal that accepted the invitation.
    pub accepted_by: Option<PrincipalId>,
}

impl Invitation {
    /// Creates a pending invitation.
    pub fn new(
        email: EmailAddress,
        organization_id: OrganizationId,
        role_kind: RoleKind,
        invited_by: PrincipalId,
        token_hash: String,
        now: DateTime<Utc>,
        time_to_live: Duration,
    ) -> AppResult<Self> {
        validate_invitable(role_kind)?;
        validate_time_to_live(time_to_live)?;

        Ok(Self {
            id: InvitationId::new(),
            email,
            organization_id,
            role_kind,
            invited_by,
            token_hash,
            status: InvitationStatus::Pending,
            expires_at: now + time_to_live,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            accepted_by: None,
        })
    }

    /// Returns the status as observed at `now` without mutating the row.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        match self.status {
            InvitationStatus::Pending if self.expires_at <= now => InvitationStatus::Expired,
            status => status,
        }
    }

    /// Returns whether the row is the non-terminal invitation for its pair.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Re-issues an open invitation in place with a fresh token and expiry.
    pub fn reissue(
        &mut self,
        role_kind: RoleKind,
        invited_by: PrincipalId,
        token_hash: String,
        now: DateTime<Utc>,
        time_to_live: Duration,
    ) -> AppResult<()> {
        self.ensure_open()?;
        validate_invitable(role_kind)?;
        validate_time_to_live(time_to_live)?;

        self.role_kind = role_kind;
        self.invited_by = invited_by;
        self.token_hash = token_hash;
        self.status = InvitationStatus::Pending;
        self.expires_at = now + time_to_live;
        self.updated_at = now;
        Ok(())
    }

    /// Checks that the invitation can be accepted at `now`.
    pub fn ensure_acceptable(&self, now: DateTime<Utc>) -> AppResult<()> {
        match self.effective_status(now) {
            InvitationStatus::Pending => Ok(()),
            InvitationStatus::Expired => Err(AppError::InvitationExpired(format!(
                "invitation '{}' expired at {}",
                self.id,
                self.expires_at.to_rfc3339()
            ))),
            InvitationStatus::Accepted | InvitationStatus::Revoked => {
                Err(self.already_processed())
            }
        }
    }

    /// Marks the invitation accepted by `principal_id`.
    pub fn accept(&mut self, principal_id: PrincipalId, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_acceptable(now)?;

        self.status = InvitationStatus::Accepted;
        self.accepted_at = Some(now);
        self.accepted_by = Some(principal_id);
        self.updated_at = now;
        Ok(())
    }

    /// Withdraws an open invitation.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_open()?;

        self.status = InvitationStatus::Revoked;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.already_processed())
        }
    }

    fn already_processed(&self) -> AppError {
        AppError::InvitationAlreadyProcessed(format!(
            "invitation '{}' is already {}",
            self.id,
            self.status.as_str()
        ))
    }
}

fn validate_invitable(role_kind: RoleKind) -> AppResult<()> {
    if role_kind.is_organization_scoped() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "role '{role_kind}' cannot be granted through an organization invitation"
        )))
    }
}

fn validate_time_to_live(time_to_live: Duration) -> AppResult<()> {
    if time_to_live <= Duration::zero() {
        return Err(AppError::Validation(
            "invitation time to live must be positive".to_owned(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use warden_core::{AppError, OrganizationId, PrincipalId};

    use super::{Invitation, InvitationStatus};
    use crate::{EmailAddress, RoleKind};

    fn pending_invitation(time_to_live: Duration) -> Invitation {
        let email = EmailAddress::new("invitee@example.com");
        let Ok(email) = email else {
            panic!("email should be valid");
        };
        let invitation = Invitation::new(
            email,
            OrganizationId::new(),
            RoleKind::User,
            PrincipalId::new(),
            "hash-1".to_owned(),
            Utc::now(),
            time_to_live,
        );
        let Ok(invitation) = invitation else {
            panic!("invitation should be valid");
        };
        invitation
    }

    #[test]
    fn system_admin_cannot_be_invited() {
        let Ok(email) = EmailAddress::new("invitee@example.com") else {
            panic!("email should be valid");
        };
        let result = Invitation::new(
            email,
            OrganizationId::new(),
            RoleKind::SystemAdmin,
            PrincipalId::new(),
            "hash".to_owned(),
            Utc::now(),
            Duration::days(7),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn pending_past_expiry_reads_as_expired_without_mutation() {
        let invitation = pending_invitation(Duration::days(1));
        let later = invitation.expires_at + Duration::seconds(1);

        assert_eq!(invitation.effective_status(later), InvitationStatus::Expired);
        assert_eq!(invitation.status, InvitationStatus::Pending);
    }

    #[test]
    fn accepting_twice_is_already_processed() {
        let mut invitation = pending_invitation(Duration::days(1));
        let now = invitation.created_at;

        assert!(invitation.accept(PrincipalId::new(), now).is_ok());
        let second = invitation.accept(PrincipalId::new(), now);
        assert!(matches!(second, Err(AppError::InvitationAlreadyProcessed(_))));
    }

    #[test]
    fn accepting_after_expiry_is_expired() {
        let mut invitation = pending_invitation(Duration::hours(1));
        let later = invitation.expires_at + Duration::minutes(1);

        let result = invitation.accept(PrincipalId::new(), later);
        assert!(matches!(result, Err(AppError::InvitationExpired(_))));
    }

    #[test]
    fn reissue_revives_an_expired_invitation_in_place() {
        let mut invitation = pending_invitation(Duration::hours(1));
        let original_id = invitation.id;
        let later = invitation.expires_at + Duration::days(3);

        let result = invitation.reissue(
            RoleKind::OrgAdmin,
            PrincipalId::new(),
            "hash-2".to_owned(),
            later,
            Duration::days(7),
        );
        assert!(result.is_ok());
        assert_eq!(invitation.id, original_id);
        assert_eq!(invitation.effective_status(later), InvitationStatus::Pending);
        assert_eq!(invitation.token_hash, "hash-2");
        assert_eq!(invitation.role_kind, RoleKind::OrgAdmin);
    }

    #[test]
    fn accepted_invitation_cannot_be_reissued_or_revoked() {
        let mut invitation = pending_invitation(Duration::days(1));
        let now = invitation.created_at;
        assert!(invitation.accept(PrincipalId::new(), now).is_ok());

        let reissued = invitation.reissue(
            RoleKind::User,
            PrincipalId::new(),
            "hash-3".to_owned(),
            now,
            Duration::days(1),
        );
        assert!(matches!(
            reissued,
            Err(AppError::InvitationAlreadyProcessed(_))
        ));
        assert!(matches!(
            invitation.revoke(now),
            Err(AppError::InvitationAlreadyProcessed(_))
        ));
    }

    #[test]
    fn revoked_invitation_is_terminal() {
        let mut invitation = pending_invitation(Duration::days(1));
        let now = invitation.created_at;

        assert!(invitation.revoke(now).is_ok());
        assert!(!invitation.is_open());
        assert!(matches!(
            invitation.ensure_acceptable(now),
            Err(AppError::InvitationAlreadyProcessed(_))
        ));
    }
}
