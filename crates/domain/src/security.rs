use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::AppError;

/// Role kinds a principal can hold, ordered by privilege.
///
/// The derived ordering is load-bearing: `SystemAdmin > OrgAdmin > User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Regular organization member.
    User,
    /// Administrator of one organization.
    OrgAdmin,
    /// System-wide administrator; never scoped to an organization.
    SystemAdmin,
}

impl RoleKind {
    /// Returns a stable storage value for this role kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::OrgAdmin => "org_admin",
            Self::SystemAdmin => "system_admin",
        }
    }

    /// Returns whether assignments of this kind must carry an organization.
    #[must_use]
    pub fn is_organization_scoped(&self) -> bool {
        !matches!(self, Self::SystemAdmin)
    }

    /// Returns all role kinds from most to least privileged.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::SystemAdmin, Self::OrgAdmin, Self::User]
    }
}

impl Display for RoleKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RoleKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "org_admin" => Ok(Self::OrgAdmin),
            "system_admin" => Ok(Self::SystemAdmin),
            _ => Err(AppError::Validation(format!(
                "unknown role kind value '{value}'"
            ))),
        }
    }
}

/// Permissions enforced by the authorization evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Allows managing principals and their system-wide roles.
    ManageSystemUsers,
    /// Allows creating, activating and deactivating organizations.
    ManageOrganizations,
    /// Allows entering the system administration console.
    AccessAdminConsole,
    /// Allows reading the audit trail.
    ViewAuditLog,
    /// Allows managing members of one organization.
    ManageOrgUsers,
    /// Allows changing settings of one organization.
    ManageOrgSettings,
    /// Allows issuing and revoking invitations for one organization.
    ManageOrgInvitations,
    /// Allows viewing an organization's dashboard.
    ViewOrganizationDashboard,
    /// Allows calling organization APIs.
    AccessApis,
    /// Allows viewing analytics.
    ViewAnalytics,
    /// Allows viewing the principal's own dashboard.
    ViewPersonalDashboard,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageSystemUsers => "system.users.manage",
            Self::ManageOrganizations => "system.organizations.manage",
            Self::AccessAdminConsole => "system.console.access",
            Self::ViewAuditLog => "system.audit.read",
            Self::ManageOrgUsers => "org.users.manage",
            Self::ManageOrgSettings => "org.settings.manage",
            Self::ManageOrgInvitations => "org.invitations.manage",
            Self::ViewOrganizationDashboard => "org.dashboard.view",
            Self::AccessApis => "apis.access",
            Self::ViewAnalytics => "analytics.view",
            Self::ViewPersonalDashboard => "dashboard.personal.view",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::ManageSystemUsers,
            Permission::ManageOrganizations,
            Permission::AccessAdminConsole,
            Permission::ViewAuditLog,
            Permission::ManageOrgUsers,
            Permission::ManageOrgSettings,
            Permission::ManageOrgInvitations,
            Permission::ViewOrganizationDashboard,
            Permission::AccessApis,
            Permission::ViewAnalytics,
            Permission::ViewPersonalDashboard,
        ];

        ALL
    }

    /// Parses a transport value into a permission.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown permission value '{value}'")))
    }
}

/// Severity attached to audit events for security review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine activity.
    Low,
    /// State-changing administrative activity.
    Medium,
    /// Security-relevant activity that must be reviewed.
    High,
}

impl AuditSeverity {
    /// Returns a stable storage value for this severity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Stable audit actions emitted by the guard and application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A guarded request was allowed.
    AuthorizationAllowed,
    /// A guarded request was denied.
    AuthorizationDenied,
    /// A guarded request arrived without a valid session.
    AuthenticationRequired,
    /// A role assignment was created.
    RoleGranted,
    /// A dormant role assignment was reactivated.
    RoleReactivated,
    /// A role assignment was deactivated.
    RoleRevoked,
    /// An invitation was created.
    InvitationCreated,
    /// An existing open invitation was re-issued with a new token.
    InvitationReissued,
    /// An invitation was accepted and converted into a role assignment.
    InvitationAccepted,
    /// An invitation was revoked.
    InvitationRevoked,
    /// An organization was created.
    OrganizationCreated,
    /// An organization was activated.
    OrganizationActivated,
    /// An organization was deactivated.
    OrganizationDeactivated,
    /// The primary audit sink rejected a write.
    AuditWriteFailed,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationAllowed => "authorization.allowed",
            Self::AuthorizationDenied => "authorization.denied",
            Self::AuthenticationRequired => "authentication.required",
            Self::RoleGranted => "role.granted",
            Self::RoleReactivated => "role.reactivated",
            Self::RoleRevoked => "role.revoked",
            Self::InvitationCreated => "invitation.created",
            Self::InvitationReissued => "invitation.reissued",
            Self::InvitationAccepted => "invitation.accepted",
            Self::InvitationRevoked => "invitation.revoked",
            Self::OrganizationCreated => "organization.created",
            Self::OrganizationActivated => "organization.activated",
            Self::OrganizationDeactivated => "organization.deactivated",
            Self::AuditWriteFailed => "audit.write_failed",
        }
    }

    /// Returns the review severity of this action.
    #[must_use]
    pub fn severity(&self) -> AuditSeverity {
        match self {
            Self::AuthorizationAllowed
            | Self::AuthenticationRequired
            | Self::InvitationCreated
            | Self::InvitationReissued
            | Self::InvitationAccepted => AuditSeverity::Low,
            Self::RoleGranted
            | Self::RoleReactivated
            | Self::RoleRevoked
            | Self::InvitationRevoked
            | Self::OrganizationCreated
            | Self::OrganizationActivated => AuditSeverity::Medium,
            Self::AuthorizationDenied
            | Self::OrganizationDeactivated
            | Self::AuditWriteFailed => AuditSeverity::High,
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::AuthorizationAllowed,
            Self::AuthorizationDenied,
            Self::AuthenticationRequired,
            Self::RoleGranted,
            Self::RoleReactivated,
            Self::RoleRevoked,
            Self::InvitationCreated,
            Self::InvitationReissued,
            Self::InvitationAccepted,
            Self::InvitationRevoked,
            Self::OrganizationCreated,
            Self::OrganizationActivated,
            Self::OrganizationDeactivated,
            Self::AuditWriteFailed,
        ]
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{AuditAction, AuditSeverity, Permission, RoleKind};

    #[test]
    fn permission_roundtrip_storage_value() {
        for permission in Permission::all() {
            let restored = Permission::from_str(permission.as_str());
            assert!(matches!(restored, Ok(value) if value == *permission));
        }
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let parsed = Permission::from_str("system.users.delete");
        assert!(parsed.is_err());
    }

    #[test]
    fn role_kinds_order_by_privilege() {
        assert!(RoleKind::SystemAdmin > RoleKind::OrgAdmin);
        assert!(RoleKind::OrgAdmin > RoleKind::User);
    }

    #[test]
    fn unknown_role_kind_is_rejected() {
        assert!(RoleKind::from_str("owner").is_err());
    }

    #[test]
    fn denials_are_high_severity() {
        assert_eq!(
            AuditAction::AuthorizationDenied.severity(),
            AuditSeverity::High
        );
        assert_eq!(AuditAction::AuditWriteFailed.severity(), AuditSeverity::High);
    }

    #[test]
    fn missing_sessions_are_low_severity() {
        assert_eq!(
            AuditAction::AuthenticationRequired.severity(),
            AuditSeverity::Low
        );
        assert!(matches!(
            AuditAction::from_str("authentication.required"),
            Ok(AuditAction::AuthenticationRequired)
        ));
    }
}
