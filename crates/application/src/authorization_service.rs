//! Application wrapper around the pure evaluator.

use std::sync::Arc;

use chrono::Utc;

use warden_core::{AppError, AppResult, OrganizationId, PrincipalId};
use warden_domain::{
    Decision, EvaluationInput, EvaluationScope, LandingPage, Organization, Permission,
    RoleAssignment, evaluate, evaluate_personal, landing_page,
};

use crate::{OrganizationRepository, RoleAssignmentRepository};

/// Loads principal state and evaluates permission checks.
///
/// Store failures surface as errors; a missing grant is always an
/// `Ok(Decision { allowed: false, .. })`.
#[derive(Clone)]
pub struct AuthorizationService {
    assignments: Arc<dyn RoleAssignmentRepository>,
    organizations: Arc<dyn OrganizationRepository>,
}

impl AuthorizationService {
    /// Creates an authorization service from repository implementations.
    #[must_use]
    pub fn new(
        assignments: Arc<dyn RoleAssignmentRepository>,
        organizations: Arc<dyn OrganizationRepository>,
    ) -> Self {
        Self {
            assignments,
            organizations,
        }
    }

    /// Evaluates a system-wide (`None`) or organization-scoped check.
    pub async fn authorize(
        &self,
        principal_id: PrincipalId,
        permission: Permission,
        organization_scope: Option<OrganizationId>,
    ) -> AppResult<Decision> {
        let assignments = self.assignments.list_for_principal(principal_id).await?;

        let decision = match organization_scope {
            None => evaluate(&EvaluationInput {
                assignments: &assignments,
                permission,
                scope: EvaluationScope::System,
                now: Utc::now(),
            }),
            Some(organization_id) => {
                let organization = self
                    .organizations
                    .find_organization(organization_id)
                    .await?;
                evaluate(&EvaluationInput {
                    assignments: &assignments,
                    permission,
                    scope: EvaluationScope::Organization {
                        id: organization_id,
                        organization: organization.as_ref(),
                    },
                    now: Utc::now(),
                })
            }
        };

        Ok(decision)
    }

    /// Evaluates a check bound to the principal alone, such as a personal dashboard.
    pub async fn authorize_personal(
        &self,
        principal_id: PrincipalId,
        permission: Permission,
    ) -> AppResult<Decision> {
        let (assignments, organizations) = self.load_principal_state(principal_id).await?;
        Ok(evaluate_personal(
            &assignments,
            &organizations,
            permission,
            Utc::now(),
        ))
    }

    /// Like [`Self::authorize`] but maps a denial to `AppError::Forbidden`.
    pub async fn require(
        &self,
        principal_id: PrincipalId,
        permission: Permission,
        organization_scope: Option<OrganizationId>,
    ) -> AppResult<Decision> {
        let decision = self
            .authorize(principal_id, permission, organization_scope)
            .await?;

        if !decision.allowed {
            let scope = organization_scope
                .map(|organization_id| format!("organization '{organization_id}'"))
                .unwrap_or_else(|| "system scope".to_owned());
            return Err(AppError::Forbidden(format!(
                "principal '{principal_id}' lacks permission '{}' in {scope} ({})",
                permission.as_str(),
                decision.reason.as_str()
            )));
        }

        Ok(decision)
    }

    /// Computes the default destination for a principal.
    pub async fn landing_page(&self, principal_id: PrincipalId) -> AppResult<LandingPage> {
        let (assignments, organizations) = self.load_principal_state(principal_id).await?;
        Ok(landing_page(&assignments, &organizations, Utc::now()))
    }

    async fn load_principal_state(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<(Vec<RoleAssignment>, Vec<Organization>)> {
        let assignments = self.assignments.list_for_principal(principal_id).await?;

        let mut organization_ids: Vec<OrganizationId> = assignments
            .iter()
            .filter_map(RoleAssignment::organization_id)
            .collect();
        organization_ids.sort();
        organization_ids.dedup();

        let organizations = if organization_ids.is_empty() {
            Vec::new()
        } else {
            self.organizations
                .find_organizations(&organization_ids)
                .await?
        };

        Ok((assignments, organizations))
    }
}

#[cfg(test)]
mod tests;
