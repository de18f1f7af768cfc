//! Role assignments binding principals to role kinds within a scope.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult, OrganizationId, PrincipalId, uuid_identifier};

use crate::catalog::default_permissions;
use crate::{Permission, RoleKind};

uuid_identifier!(
    /// Stable role assignment identifier; survives revoke and reactivation.
    RoleAssignmentId
);

/// Grant of a role kind to a principal, optionally scoped to an organization.
///
/// Assignments are never deleted. Revocation flips `is_active` and a later
/// grant or accepted invitation reactivates the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    id: RoleAssignmentId,
    principal_id: PrincipalId,
    role_kind: RoleKind,
    organization_id: Option<OrganizationId>,
    permission_overrides: BTreeSet<Permission>,
    is_active: bool,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Creates a new active assignment after checking the scope invariant.
    pub fn new(
        principal_id: PrincipalId,
        role_kind: RoleKind,
        organization_id: Option<OrganizationId>,
        permission_overrides: BTreeSet<Permission>,
        assigned_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        Self::from_parts(
            RoleAssignmentId::new(),
            principal_id,
            role_kind,
            organization_id,
            permission_overrides,
            true,
            assigned_at,
            expires_at,
        )
    }

    /// Rebuilds an assignment from persisted columns, re-checking invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RoleAssignmentId,
        principal_id: PrincipalId,
        role_kind: RoleKind,
        organization_id: Option<OrganizationId>,
        permission_overrides: BTreeSet<Permission>,
        is_active: bool,
        assigned_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        validate_scope(role_kind, organization_id)?;

        Ok(Self {
            id,
            principal_id,
            role_kind,
            organization_id,
            permission_overrides,
            is_active,
            assigned_at,
            expires_at,
        })
    }

    /// Returns the assignment identifier.
    #[must_use]
    pub fn id(&self) -> RoleAssignmentId {
        self.id
    }

    /// Returns the principal holding the role.
    #[must_use]
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Returns the granted role kind.
    #[must_use]
    pub fn role_kind(&self) -> RoleKind {
        self.role_kind
    }

    /// Returns the organization scope; `None` means system-wide.
    #[must_use]
    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    /// Returns explicit permissions granted on top of the role defaults.
    #[must_use]
    pub fn permission_overrides(&self) -> &BTreeSet<Permission> {
        &self.permission_overrides
    }

    /// Returns the stored active flag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns when the role was (last) assigned.
    #[must_use]
    pub fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    /// Returns the optional expiry.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns whether the assignment grants anything at `now`.
    ///
    /// A cleared active flag and a past expiry are equivalent.
    #[must_use]
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Returns role defaults unioned with the explicit overrides.
    #[must_use]
    pub fn effective_permissions(&self) -> BTreeSet<Permission> {
        default_permissions(self.role_kind)
            .iter()
            .copied()
            .chain(self.permission_overrides.iter().copied())
            .collect()
    }

    /// Returns whether the effective set contains `permission`.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        default_permissions(self.role_kind).contains(&permission)
            || self.permission_overrides.contains(&permission)
    }

    /// Soft-deactivates the assignment.
    pub fn deactivate(&mut self) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::Conflict(format!(
                "role assignment '{}' is already inactive",
                self.id
            )));
        }

        self.is_active = false;
        Ok(())
    }

    /// Reactivates a dormant assignment in place, keeping its identifier.
    pub fn reactivate(
        &mut self,
        role_kind: RoleKind,
        permission_overrides: BTreeSet<Permission>,
        assigned_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        if self.is_effective_at(assigned_at) {
            return Err(AppError::AlreadyMember(format!(
                "principal '{}' already holds an active role in this scope",
                self.principal_id
            )));
        }

        validate_scope(role_kind, self.organization_id)?;

        self.role_kind = role_kind;
        self.permission_overrides = permission_overrides;
        self.is_active = true;
        self.assigned_at = assigned_at;
        self.expires_at = expires_at;
        Ok(())
    }
}

fn validate_scope(role_kind: RoleKind, organization_id: Option<OrganizationId>) -> AppResult<()> {
    match (role_kind.is_organization_scoped(), organization_id) {
        (true, Some(_)) | (false, None) => Ok(()),
        (true, None) => Err(AppError::Validation(format!(
            "role '{role_kind}' requires an organization scope"
        ))),
        (false, Some(organization_id)) => Err(AppError::Validation(format!(
            "role '{role_kind}' cannot be scoped to organization '{organization_id}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};
    use warden_core::{AppError, OrganizationId, PrincipalId};

    use super::RoleAssignment;
    use crate::{Permission, RoleKind};

    #[test]
    fn system_admin_must_not_carry_an_organization() {
        let result = RoleAssignment::new(
            PrincipalId::new(),
            RoleKind::SystemAdmin,
            Some(OrganizationId::new()),
            BTreeSet::new(),
            Utc::now(),
            None,
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn organization_roles_require_an_organization() {
        for role_kind in [RoleKind::OrgAdmin, RoleKind::User] {
            let result = RoleAssignment::new(
                PrincipalId::new(),
                role_kind,
                None,
                BTreeSet::new(),
                Utc::now(),
                None,
            );
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn overrides_are_unioned_with_defaults() {
        let assignment = RoleAssignment::new(
            PrincipalId::new(),
            RoleKind::User,
            Some(OrganizationId::new()),
            BTreeSet::from([Permission::ViewAnalytics]),
            Utc::now(),
            None,
        );
        let Ok(assignment) = assignment else {
            panic!("assignment should be valid");
        };

        assert!(assignment.grants(Permission::ViewAnalytics));
        assert!(assignment.grants(Permission::AccessApis));
        assert!(!assignment.grants(Permission::ManageOrgUsers));
    }

    #[test]
    fn expired_assignment_is_not_effective_even_when_flag_is_set() {
        let now = Utc::now();
        let assignment = RoleAssignment::new(
            PrincipalId::new(),
            RoleKind::OrgAdmin,
            Some(OrganizationId::new()),
            BTreeSet::new(),
            now - Duration::days(2),
            Some(now - Duration::days(1)),
        );
        let Ok(assignment) = assignment else {
            panic!("assignment should be valid");
        };

        assert!(assignment.is_active());
        assert!(!assignment.is_effective_at(now));
    }

    #[test]
    fn reactivation_keeps_identifier_and_updates_role() {
        let now = Utc::now();
        let Ok(mut assignment) = RoleAssignment::new(
            PrincipalId::new(),
            RoleKind::User,
            Some(OrganizationId::new()),
            BTreeSet::new(),
            now,
            None,
        ) else {
            panic!("assignment should be valid");
        };
        let original_id = assignment.id();

        assert!(assignment.deactivate().is_ok());
        assert!(
            assignment
                .reactivate(RoleKind::OrgAdmin, BTreeSet::new(), now, None)
                .is_ok()
        );

        assert_eq!(assignment.id(), original_id);
        assert_eq!(assignment.role_kind(), RoleKind::OrgAdmin);
        assert!(assignment.is_effective_at(now));
    }

    #[test]
    fn reactivating_an_effective_assignment_is_already_member() {
        let now = Utc::now();
        let Ok(mut assignment) = RoleAssignment::new(
            PrincipalId::new(),
            RoleKind::User,
            Some(OrganizationId::new()),
            BTreeSet::new(),
            now,
            None,
        ) else {
            panic!("assignment should be valid");
        };

        let result = assignment.reactivate(RoleKind::User, BTreeSet::new(), now, None);
        assert!(matches!(result, Err(AppError::AlreadyMember(_))));
    }
}
