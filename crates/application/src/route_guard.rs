//! Request guard: identity resolution plus a route-table permission check.

use tracing::error;
use warden_core::{AppError, OrganizationId, PrincipalContext, PrincipalId};
use warden_domain::{DecisionReason, LandingPage, Permission, Principal};

use crate::route_policy::{RouteRequirement, RouteResolution, RouteScope, resolve_route};
use crate::{AuditService, AuthorizationService, DecisionAudit, IdentityService, RequestMetadata};

/// Request attributes the guard decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRequest {
    /// HTTP method.
    pub method: String,
    /// Request path without query.
    pub path: String,
    /// Raw query string, preserved for login redirects.
    pub query: Option<String>,
    /// Session token from the bearer header or session cookie.
    pub session_token: Option<String>,
    /// Request attributes for auditing.
    pub metadata: RequestMetadata,
}

impl GuardRequest {
    fn return_to(&self) -> String {
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => format!("{}?{query}", self.path),
            _ => self.path.clone(),
        }
    }
}

/// Guard verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Public path; no identity lookup was made.
    Bypass,
    /// No valid session.
    RedirectToLogin {
        /// Original path and query.
        return_to: String,
    },
    /// Identity provider or store failed; the request must not proceed.
    Unavailable {
        /// Operator-facing failure description.
        message: String,
    },
    /// Authenticated but not permitted.
    RedirectToLanding {
        /// Where the principal should go instead.
        landing: LandingPage,
        /// Permission the route required.
        required: Permission,
        /// Why the check failed.
        reason: DecisionReason,
    },
    /// Authenticated request to a path outside the route table.
    NotFound,
    /// Allowed; the context is attached to the request.
    Forward(PrincipalContext),
}

/// Decides whether requests may reach their handlers.
#[derive(Clone)]
pub struct RouteGuard {
    identity_service: IdentityService,
    authorization_service: AuthorizationService,
    audit_service: AuditService,
}

impl RouteGuard {
    /// Creates a guard from its collaborators.
    #[must_use]
    pub fn new(
        identity_service: IdentityService,
        authorization_service: AuthorizationService,
        audit_service: AuditService,
    ) -> Self {
        Self {
            identity_service,
            authorization_service,
            audit_service,
        }
    }

    /// Runs the guard for one request. Failures of any dependency end in
    /// `Unavailable`, never in `Forward`.
    pub async fn check(&self, request: &GuardRequest) -> GuardOutcome {
        let resolution = resolve_route(&request.path);
        if resolution == RouteResolution::Public {
            return GuardOutcome::Bypass;
        }

        let Some(session_token) = request.session_token.as_deref() else {
            return self.redirect_to_login(request).await;
        };

        let principal = match self.identity_service.resolve(session_token).await {
            Ok(principal) => principal,
            Err(AppError::Unauthorized(_)) => return self.redirect_to_login(request).await,
            Err(error) => return self.fail_closed(request, None, None, &error).await,
        };

        let route = match resolution {
            RouteResolution::Protected(route) => route,
            RouteResolution::Public | RouteResolution::Unmapped => {
                let audit = Self::decision(request, &principal, None, None, false, "route_unmapped");
                if let Err(error) = self.audit_service.record_decision(audit).await {
                    return unavailable(&error);
                }
                return GuardOutcome::NotFound;
            }
        };

        let (permission, scope) = match route.requirement {
            RouteRequirement::Authenticated => {
                let audit =
                    Self::decision(request, &principal, None, None, true, "authenticated");
                if let Err(error) = self.audit_service.record_decision(audit).await {
                    return unavailable(&error);
                }
                return GuardOutcome::Forward(PrincipalContext::new(
                    principal.id,
                    principal.email.as_str(),
                    None,
                ));
            }
            RouteRequirement::Permission { permission, scope } => (permission, scope),
        };

        let organization_id = match scope {
            RouteScope::OrganizationFromPath => route.organization_id,
            RouteScope::System | RouteScope::Principal => None,
        };

        let decision = match scope {
            RouteScope::Principal => {
                self.authorization_service
                    .authorize_personal(principal.id, permission)
                    .await
            }
            RouteScope::System | RouteScope::OrganizationFromPath => {
                self.authorization_service
                    .authorize(principal.id, permission, organization_id)
                    .await
            }
        };
        let decision = match decision {
            Ok(decision) => decision,
            Err(error) => {
                return self
                    .fail_closed(request, Some(principal.id), Some(permission), &error)
                    .await;
            }
        };

        if decision.allowed {
            let mut audit = Self::decision(
                request,
                &principal,
                organization_id,
                Some(permission),
                true,
                decision.reason.as_str(),
            );
            audit.matched_role = decision
                .matched_role()
                .map(|assignment| assignment.role_kind().as_str().to_owned());
            if let Err(error) = self.audit_service.record_decision(audit).await {
                return unavailable(&error);
            }

            return GuardOutcome::Forward(PrincipalContext::new(
                principal.id,
                principal.email.as_str(),
                organization_id,
            ));
        }

        let landing = match self.authorization_service.landing_page(principal.id).await {
            Ok(landing) => landing,
            Err(error) => {
                return self
                    .fail_closed(request, Some(principal.id), Some(permission), &error)
                    .await;
            }
        };

        let mut audit = Self::decision(
            request,
            &principal,
            organization_id,
            Some(permission),
            false,
            decision.reason.as_str(),
        );
        audit.landing = Some(landing.path());
        if let Err(error) = self.audit_service.record_decision(audit).await {
            return unavailable(&error);
        }

        GuardOutcome::RedirectToLanding {
            landing,
            required: permission,
            reason: decision.reason,
        }
    }

    async fn redirect_to_login(&self, request: &GuardRequest) -> GuardOutcome {
        if let Err(error) = self
            .audit_service
            .record_unauthenticated(&request.method, &request.path, &request.metadata)
            .await
        {
            return unavailable(&error);
        }

        GuardOutcome::RedirectToLogin {
            return_to: request.return_to(),
        }
    }

    async fn fail_closed(
        &self,
        request: &GuardRequest,
        principal_id: Option<PrincipalId>,
        permission: Option<Permission>,
        error: &AppError,
    ) -> GuardOutcome {
        let reason = if error.is_transient() {
            "dependency_unavailable"
        } else {
            "dependency_failed"
        };

        let audit = DecisionAudit {
            principal_id,
            organization_id: None,
            permission,
            method: request.method.clone(),
            path: request.path.clone(),
            allowed: false,
            reason: reason.to_owned(),
            matched_role: None,
            landing: None,
            metadata: request.metadata.clone(),
        };
        // Both sinks failed; the outcome is Unavailable either way.
        if let Err(audit_error) = self.audit_service.record_decision(audit).await {
            error!(
                path = request.path.as_str(),
                error = %audit_error,
                "failed to audit fail-closed decision"
            );
        }

        unavailable(error)
    }

    fn decision(
        request: &GuardRequest,
        principal: &Principal,
        organization_id: Option<OrganizationId>,
        permission: Option<Permission>,
        allowed: bool,
        reason: &str,
    ) -> DecisionAudit {
        DecisionAudit {
            principal_id: Some(principal.id),
            organization_id,
            permission,
            method: request.method.clone(),
            path: request.path.clone(),
            allowed,
            reason: reason.to_owned(),
            matched_role: None,
            landing: None,
            metadata: request.metadata.clone(),
        }
    }
}

fn unavailable(error: &AppError) -> GuardOutcome {
    GuardOutcome::Unavailable {
        message: error.to_string(),
    }
}
