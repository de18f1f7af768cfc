//! Identity provider adapter for an external HTTP identity service.
//!
//! Wire contract:
//! - `GET {base}/session` with `Authorization: Bearer <token>` returns the
//!   session's principal.
//! - `POST {base}/principals/lookup` with `{"email": ...}` returns a principal.
//! - `GET {base}/principals/{id}` returns a principal.
//!
//! `401` and `404` mean "no such principal"; connection failures, timeouts
//! and `5xx` answers are transient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use warden_application::IdentityProvider;
use warden_core::{AppError, AppResult, PrincipalId};
use warden_domain::{EmailAddress, Principal};

/// HTTP-backed identity provider.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PrincipalPayload {
    id: Uuid,
    email: String,
    is_active: bool,
}

#[derive(Debug, Serialize)]
struct EmailLookupRequest<'a> {
    email: &'a str,
}

impl HttpIdentityProvider {
    /// Creates a provider with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build identity HTTP client: {error}"))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> AppResult<Option<Principal>> {
        let response = request.send().await.map_err(|error| {
            warn!(operation, error = %error, "identity provider request failed");
            AppError::Unavailable(format!("identity provider unreachable during {operation}: {error}"))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if status.is_server_error() {
            warn!(operation, status = status.as_u16(), "identity provider answered with an error");
            return Err(AppError::Unavailable(format!(
                "identity provider returned {status} during {operation}"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "identity provider returned unexpected {status} during {operation}"
            )));
        }

        let payload = response.json::<PrincipalPayload>().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to decode identity provider response during {operation}: {error}"
            ))
        })?;
        let email = EmailAddress::new(payload.email).map_err(|error| {
            AppError::Internal(format!("identity provider returned an invalid email: {error}"))
        })?;

        Ok(Some(Principal {
            id: PrincipalId::from_uuid(payload.id),
            email,
            is_active: payload.is_active,
        }))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn find_by_session_token(&self, session_token: &str) -> AppResult<Option<Principal>> {
        let request = self
            .http_client
            .get(format!("{}/session", self.base_url))
            .bearer_auth(session_token);
        self.fetch("session lookup", request).await
    }

    async fn find_by_email(&self, email: &EmailAddress) -> AppResult<Option<Principal>> {
        let request = self
            .http_client
            .post(format!("{}/principals/lookup", self.base_url))
            .json(&EmailLookupRequest {
                email: email.as_str(),
            });
        self.fetch("email lookup", request).await
    }

    async fn find_by_id(&self, principal_id: PrincipalId) -> AppResult<Option<Principal>> {
        let request = self
            .http_client
            .get(format!("{}/principals/{principal_id}", self.base_url));
        self.fetch("principal lookup", request).await
    }
}
