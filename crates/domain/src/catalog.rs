//! Compiled role → permission catalog.
//!
//! Every evaluator instance in a deployment must see the same table, so it is
//! a constant rather than configuration.

use crate::{Permission, RoleKind};

const SYSTEM_ADMIN_PERMISSIONS: &[Permission] = &[
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

const ORG_ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ManageOrgUsers,
    Permission::ManageOrgSettings,
    Permission::ManageOrgInvitations,
    Permission::ViewOrganizationDashboard,
    Permission::AccessApis,
    Permission::ViewAnalytics,
    Permission::ViewPersonalDashboard,
];

const USER_PERMISSIONS: &[Permission] = &[
    Permission::ViewOrganizationDashboard,
    Permission::AccessApis,
    Permission::ViewPersonalDashboard,
];

/// Returns the default permission set granted by a role kind.
#[must_use]
pub fn default_permissions(role_kind: RoleKind) -> &'static [Permission] {
    match role_kind {
        RoleKind::SystemAdmin => SYSTEM_ADMIN_PERMISSIONS,
        RoleKind::OrgAdmin => ORG_ADMIN_PERMISSIONS,
        RoleKind::User => USER_PERMISSIONS,
    }
}

#[cfg(test)]
mod tests {
    use crate::{Permission, RoleKind};

    use super::default_permissions;

    #[test]
    fn catalog_is_total_and_never_empty() {
        for role_kind in RoleKind::all() {
            assert!(!default_permissions(*role_kind).is_empty());
        }
    }

    #[test]
    fn system_admin_holds_every_permission() {
        let granted = default_permissions(RoleKind::SystemAdmin);
        for permission in Permission::all() {
            assert!(granted.contains(permission), "missing {permission}");
        }
    }

    #[test]
    fn higher_roles_are_supersets_of_lower_roles() {
        let org_admin = default_permissions(RoleKind::OrgAdmin);
        for permission in default_permissions(RoleKind::User) {
            assert!(org_admin.contains(permission));
        }
    }

    #[test]
    fn organization_roles_never_grant_system_permissions() {
        for role_kind in [RoleKind::OrgAdmin, RoleKind::User] {
            let granted = default_permissions(role_kind);
            assert!(!granted.contains(&Permission::ManageOrganizations));
            assert!(!granted.contains(&Permission::ManageSystemUsers));
            assert!(!granted.contains(&Permission::AccessAdminConsole));
        }
    }
}
