//! Pure authorization evaluation.
//!
//! Nothing here performs I/O: callers load assignments and organizations and
//! pass them in together with the evaluation instant, so decisions are
//! deterministic for identical inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::OrganizationId;

use crate::{Organization, Permission, RoleAssignment, RoleKind};

/// Scope a permission is checked against.
#[derive(Debug, Clone, Copy)]
pub enum EvaluationScope<'a> {
    /// System-wide action; only system administrators qualify.
    System,
    /// Organization-scoped action. `organization` is `None` when the id is unknown.
    Organization {
        /// Requested organization id.
        id: OrganizationId,
        /// Loaded organization snapshot.
        organization: Option<&'a Organization>,
    },
}

/// Inputs of one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// Every assignment held by the principal, active or not.
    pub assignments: &'a [RoleAssignment],
    /// Permission required by the action.
    pub permission: Permission,
    /// Scope of the action.
    pub scope: EvaluationScope<'a>,
    /// Evaluation instant used for expiry checks.
    pub now: DateTime<Utc>,
}

/// Machine-readable reason attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Allowed through a system administrator assignment.
    SystemAdmin,
    /// Allowed through assignments in the requested scope.
    RoleGrant,
    /// Denied because the organization is deactivated.
    OrganizationInactive,
    /// Denied because the organization does not exist.
    OrganizationNotFound,
    /// Denied because no effective assignment carries the permission.
    PermissionDenied,
}

impl DecisionReason {
    /// Returns the stable reason code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAdmin => "system_admin",
            Self::RoleGrant => "role_grant",
            Self::OrganizationInactive => "organization_inactive",
            Self::OrganizationNotFound => "organization_not_found",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

/// Evaluator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the action is allowed.
    pub allowed: bool,
    /// Why the decision was reached.
    pub reason: DecisionReason,
    /// Assignments that contributed the permission; empty on denial.
    pub matched_assignments: Vec<RoleAssignment>,
}

impl Decision {
    fn allow(reason: DecisionReason, matched_assignments: Vec<RoleAssignment>) -> Self {
        Self {
            allowed: true,
            reason,
            matched_assignments,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
            matched_assignments: Vec::new(),
        }
    }

    /// Returns the highest-privilege contributing assignment.
    #[must_use]
    pub fn matched_role(&self) -> Option<&RoleAssignment> {
        self.matched_assignments
            .iter()
            .max_by_key(|assignment| assignment.role_kind())
    }
}

/// Decides whether the principal owning `input.assignments` may act.
#[must_use]
pub fn evaluate(input: &EvaluationInput<'_>) -> Decision {
    let effective: Vec<&RoleAssignment> = input
        .assignments
        .iter()
        .filter(|assignment| assignment.is_effective_at(input.now))
        .collect();

    let system_admin_grants: Vec<RoleAssignment> = effective
        .iter()
        .filter(|assignment| {
            assignment.role_kind() == RoleKind::SystemAdmin && assignment.grants(input.permission)
        })
        .map(|assignment| (*assignment).clone())
        .collect();

    match input.scope {
        EvaluationScope::System => {
            if system_admin_grants.is_empty() {
                Decision::deny(DecisionReason::PermissionDenied)
            } else {
                Decision::allow(DecisionReason::SystemAdmin, system_admin_grants)
            }
        }
        EvaluationScope::Organization { id, organization } => {
            let Some(organization) = organization else {
                return Decision::deny(DecisionReason::OrganizationNotFound);
            };
            if !organization.is_active {
                return Decision::deny(DecisionReason::OrganizationInactive);
            }

            if !system_admin_grants.is_empty() {
                return Decision::allow(DecisionReason::SystemAdmin, system_admin_grants);
            }

            let scoped_grants: Vec<RoleAssignment> = effective
                .iter()
                .filter(|assignment| {
                    assignment.organization_id() == Some(id)
                        && assignment.grants(input.permission)
                })
                .map(|assignment| (*assignment).clone())
                .collect();

            if scoped_grants.is_empty() {
                Decision::deny(DecisionReason::PermissionDenied)
            } else {
                Decision::allow(DecisionReason::RoleGrant, scoped_grants)
            }
        }
    }
}

/// Decides a principal-scoped check (no organization, no system scope).
///
/// Any effective assignment carrying the permission qualifies, provided its
/// organization, when it has one, is known and active.
#[must_use]
pub fn evaluate_personal(
    assignments: &[RoleAssignment],
    organizations: &[Organization],
    permission: Permission,
    now: DateTime<Utc>,
) -> Decision {
    let matched: Vec<RoleAssignment> = assignments
        .iter()
        .filter(|assignment| assignment.is_effective_at(now) && assignment.grants(permission))
        .filter(|assignment| match assignment.organization_id() {
            None => true,
            Some(organization_id) => is_active_organization(organizations, organization_id),
        })
        .cloned()
        .collect();

    if matched.is_empty() {
        return Decision::deny(DecisionReason::PermissionDenied);
    }

    let reason = if matched
        .iter()
        .any(|assignment| assignment.role_kind() == RoleKind::SystemAdmin)
    {
        DecisionReason::SystemAdmin
    } else {
        DecisionReason::RoleGrant
    };

    Decision::allow(reason, matched)
}

/// Default destination for an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "organization_id", rename_all = "snake_case")]
pub enum LandingPage {
    /// System administration home.
    SystemAdminHome,
    /// Dashboard of the organization the principal ranks highest in.
    OrganizationDashboard(OrganizationId),
    /// Onboarding for principals without any usable role.
    Onboarding,
}

impl LandingPage {
    /// Returns the route path of the landing page.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::SystemAdminHome => "/admin".to_owned(),
            Self::OrganizationDashboard(organization_id) => {
                format!("/org/{organization_id}/dashboard")
            }
            Self::Onboarding => "/onboarding".to_owned(),
        }
    }
}

/// Picks the highest-privilege landing page reachable by the principal.
///
/// Organization dashboards only consider active organizations; ties between
/// equally ranked assignments go to the most recently assigned one.
#[must_use]
pub fn landing_page(
    assignments: &[RoleAssignment],
    organizations: &[Organization],
    now: DateTime<Utc>,
) -> LandingPage {
    let effective = assignments
        .iter()
        .filter(|assignment| assignment.is_effective_at(now));

    let mut best: Option<&RoleAssignment> = None;
    for assignment in effective {
        if assignment.role_kind() == RoleKind::SystemAdmin {
            return LandingPage::SystemAdminHome;
        }

        let Some(organization_id) = assignment.organization_id() else {
            continue;
        };
        if !is_active_organization(organizations, organization_id) {
            continue;
        }

        let outranks = best.is_none_or(|current| {
            (assignment.role_kind(), assignment.assigned_at())
                > (current.role_kind(), current.assigned_at())
        });
        if outranks {
            best = Some(assignment);
        }
    }

    best.and_then(RoleAssignment::organization_id)
        .map(LandingPage::OrganizationDashboard)
        .unwrap_or(LandingPage::Onboarding)
}

fn is_active_organization(organizations: &[Organization], organization_id: OrganizationId) -> bool {
    organizations
        .iter()
        .any(|organization| organization.id == organization_id && organization.is_active)
}
