use serde::{Deserialize, Serialize};

use crate::{OrganizationId, PrincipalId};

/// Immutable principal context attached to a request once the guard allowed it.
///
/// Handlers read it from request extensions instead of re-resolving identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    email: String,
    organization_id: Option<OrganizationId>,
}

impl PrincipalContext {
    /// Creates a principal context for one request.
    #[must_use]
    pub fn new(
        principal_id: PrincipalId,
        email: impl Into<String>,
        organization_id: Option<OrganizationId>,
    ) -> Self {
        Self {
            principal_id,
            email: email.into(),
            organization_id,
        }
    }

    /// Returns the stable principal identifier.
    #[must_use]
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Returns the principal's email address.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the organization scope the request was authorized against.
    #[must_use]
    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }
}
