//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod authorization;
mod catalog;
mod invitation;
mod organization;
mod principal;
mod role_assignment;
mod security;

pub use authorization::{
    Decision, DecisionReason, EvaluationInput, EvaluationScope, LandingPage, evaluate,
    evaluate_personal, landing_page,
};
pub use catalog::default_permissions;
pub use invitation::{Invitation, InvitationId, InvitationStatus};
pub use organization::{Organization, OrganizationSlug, PlanLimits, SubscriptionPlan};
pub use principal::{EmailAddress, Principal};
pub use role_assignment::{RoleAssignment, RoleAssignmentId};
pub use security::{AuditAction, AuditSeverity, Permission, RoleKind};
