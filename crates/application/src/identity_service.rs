use std::sync::Arc;

use async_trait::async_trait;

use warden_core::{AppError, AppResult, PrincipalId};
use warden_domain::{EmailAddress, Principal};

/// Port for the external identity provider that owns principals and sessions.
///
/// Adapters return `Ok(None)` for unknown tokens or principals and
/// `AppError::Unavailable` when the provider cannot be reached.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves an opaque session token.
    async fn find_by_session_token(&self, session_token: &str) -> AppResult<Option<Principal>>;

    /// Looks up a principal by canonical email.
    async fn find_by_email(&self, email: &EmailAddress) -> AppResult<Option<Principal>>;

    /// Looks up a principal by id.
    async fn find_by_id(&self, principal_id: PrincipalId) -> AppResult<Option<Principal>>;
}

/// Resolves request credentials into principals.
#[derive(Clone)]
pub struct IdentityService {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityService {
    /// Creates a new identity service.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Resolves a session token into an active principal.
    pub async fn resolve(&self, session_token: &str) -> AppResult<Principal> {
        let session_token = session_token.trim();
        if session_token.is_empty() {
            return Err(AppError::Unauthorized("session token is missing".to_owned()));
        }

        let principal = self
            .provider
            .find_by_session_token(session_token)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized("session token is invalid or expired".to_owned())
            })?;

        if !principal.is_active {
            return Err(AppError::Unauthorized(format!(
                "principal '{}' is deactivated",
                principal.id
            )));
        }

        Ok(principal)
    }

    /// Looks up a principal by email.
    pub async fn find_by_email(&self, email: &EmailAddress) -> AppResult<Option<Principal>> {
        self.provider.find_by_email(email).await
    }

    /// Looks up a principal by id.
    pub async fn find_by_id(&self, principal_id: PrincipalId) -> AppResult<Option<Principal>> {
        self.provider.find_by_id(principal_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use warden_core::{AppError, AppResult, PrincipalId};
    use warden_domain::{EmailAddress, Principal};

    use super::{IdentityProvider, IdentityService};

    struct FakeIdentityProvider {
        principal: Option<Principal>,
        unavailable: bool,
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentityProvider {
        async fn find_by_session_token(
            &self,
            session_token: &str,
        ) -> AppResult<Option<Principal>> {
            if self.unavailable {
                return Err(AppError::Unavailable("identity provider offline".to_owned()));
            }
            Ok(self
                .principal
                .clone()
                .filter(|_| session_token == "valid-token"))
        }

        async fn find_by_email(&self, _email: &EmailAddress) -> AppResult<Option<Principal>> {
            Ok(self.principal.clone())
        }

        async fn find_by_id(&self, _principal_id: PrincipalId) -> AppResult<Option<Principal>> {
            Ok(self.principal.clone())
        }
    }

    fn principal(is_active: bool) -> Principal {
        let Ok(email) = EmailAddress::new("ops@example.com") else {
            panic!("fixture email should be valid");
        };
        Principal {
            id: PrincipalId::new(),
            email,
            is_active,
        }
    }

    fn service(principal: Option<Principal>, unavailable: bool) -> IdentityService {
        IdentityService::new(Arc::new(FakeIdentityProvider {
            principal,
            unavailable,
        }))
    }

    #[tokio::test]
    async fn resolve_returns_active_principal() {
        let expected = principal(true);
        let resolved = service(Some(expected.clone()), false)
            .resolve("valid-token")
            .await;
        assert!(matches!(resolved, Ok(found) if found == expected));
    }

    #[tokio::test]
    async fn resolve_rejects_blank_unknown_and_deactivated() {
        let service_with_active = service(Some(principal(true)), false);
        assert!(matches!(
            service_with_active.resolve("   ").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            service_with_active.resolve("stale-token").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            service(Some(principal(false)), false)
                .resolve("valid-token")
                .await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn provider_outage_is_transient_not_unauthenticated() {
        let result = service(None, true).resolve("valid-token").await;
        assert!(matches!(&result, Err(error) if error.is_transient()));
    }
}
