use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use warden_application::IdentityProvider;
use warden_core::{AppResult, PrincipalId};
use warden_domain::{EmailAddress, Principal};

#[derive(Debug, Default)]
struct Directory {
    principals: HashMap<PrincipalId, Principal>,
    sessions: HashMap<String, PrincipalId>,
}

/// Identity provider backed by process memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    directory: RwLock<Directory>,
}

impl InMemoryIdentityProvider {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a principal.
    pub async fn upsert_principal(&self, principal: Principal) {
        self.directory
            .write()
            .await
            .principals
            .insert(principal.id, principal);
    }

    /// Opens a session for a known principal.
    pub async fn open_session(&self, session_token: impl Into<String>, principal_id: PrincipalId) {
        self.directory
            .write()
            .await
            .sessions
            .insert(session_token.into(), principal_id);
    }

    /// Ends a session; unknown tokens are ignored.
    pub async fn close_session(&self, session_token: &str) {
        self.directory.write().await.sessions.remove(session_token);
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn find_by_session_token(&self, session_token: &str) -> AppResult<Option<Principal>> {
        let directory = self.directory.read().await;
        Ok(directory
            .sessions
            .get(session_token)
            .and_then(|principal_id| directory.principals.get(principal_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> AppResult<Option<Principal>> {
        Ok(self
            .directory
            .read()
            .await
            .principals
            .values()
            .find(|principal| &principal.email == email)
            .cloned())
    }

    async fn find_by_id(&self, principal_id: PrincipalId) -> AppResult<Option<Principal>> {
        Ok(self
            .directory
            .read()
            .await
            .principals
            .get(&principal_id)
            .cloned())
    }
}
