//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Authenticated request context shared across services.
pub mod auth;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::PrincipalContext;

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Declares a UUID-backed identifier newtype with the usual conversions.
#[macro_export]
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ::serde::Serialize, ::serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Creates a random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: ::uuid::Uuid) -> Self {
                Self(value)
            }

            /// Parses an identifier from its hyphenated string form.
            pub fn parse(value: &str) -> $crate::AppResult<Self> {
                ::uuid::Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|error| {
                        $crate::AppError::Validation(format!(
                            "invalid {} '{value}': {error}",
                            stringify!($name)
                        ))
                    })
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Organization identifier; the tenant boundary for scoped roles.
    OrganizationId
);

uuid_identifier!(
    /// Stable identifier of a principal issued by the identity provider.
    PrincipalId
);

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No valid principal could be established for the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Principal is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Invitation is past its expiry and must be re-issued.
    #[error("invitation expired: {0}")]
    InvitationExpired(String),

    /// Invitation was already accepted or revoked.
    #[error("invitation already processed: {0}")]
    InvitationAlreadyProcessed(String),

    /// Target already holds an active role in the organization.
    #[error("already a member: {0}")]
    AlreadyMember(String),

    /// Identity provider or backing store could not be reached; retryable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the caller may retry the failed operation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
