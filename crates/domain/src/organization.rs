//! Organizations: the tenant boundary for scoped roles and plan limits.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult, NonEmptyString, OrganizationId};

const SLUG_MAX_LENGTH: usize = 63;

/// Unique URL-safe organization handle matching `[a-z0-9-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationSlug(String);

impl OrganizationSlug {
    /// Creates a validated slug. Input is not lowercased implicitly.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();

        if value.is_empty() || value.len() > SLUG_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "organization slug must be between 1 and {SLUG_MAX_LENGTH} characters"
            )));
        }

        if !value
            .chars()
            .all(|character| matches!(character, 'a'..='z' | '0'..='9' | '-'))
        {
            return Err(AppError::Validation(format!(
                "organization slug '{value}' may only contain lowercase letters, digits and '-'"
            )));
        }

        if value.starts_with('-') || value.ends_with('-') {
            return Err(AppError::Validation(format!(
                "organization slug '{value}' must not start or end with '-'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the slug string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for OrganizationSlug {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrganizationSlug> for String {
    fn from(value: OrganizationSlug) -> Self {
        value.0
    }
}

/// Numeric limits implied by a subscription plan. `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum number of members (active assignments plus open invitations).
    pub max_users: i32,
    /// Maximum number of registered APIs.
    pub max_apis: i32,
}

impl PlanLimits {
    /// Sentinel for an unlimited quota.
    pub const UNLIMITED: i32 = -1;

    /// Returns whether `count` seats fit within the user limit.
    #[must_use]
    pub fn allows_users(&self, count: usize) -> bool {
        self.max_users == Self::UNLIMITED
            || usize::try_from(self.max_users).is_ok_and(|limit| count <= limit)
    }
}

/// Subscription plan of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    /// Free tier.
    Free,
    /// Basic paid tier.
    Basic,
    /// Premium paid tier.
    Premium,
    /// Enterprise tier without quotas.
    Enterprise,
}

impl SubscriptionPlan {
    /// Returns a stable storage value for this plan.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }

    /// Returns the quotas implied by this plan.
    #[must_use]
    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                max_users: 5,
                max_apis: 1,
            },
            Self::Basic => PlanLimits {
                max_users: 25,
                max_apis: 5,
            },
            Self::Premium => PlanLimits {
                max_users: 100,
                max_apis: 25,
            },
            Self::Enterprise => PlanLimits {
                max_users: PlanLimits::UNLIMITED,
                max_apis: PlanLimits::UNLIMITED,
            },
        }
    }
}

impl FromStr for SubscriptionPlan {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(AppError::Validation(format!(
                "unknown subscription plan '{value}'"
            ))),
        }
    }
}

/// Tenant organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization identifier.
    pub id: OrganizationId,
    /// Unique slug.
    pub slug: OrganizationSlug,
    /// Display name.
    pub name: NonEmptyString,
    /// Subscription plan.
    pub plan: SubscriptionPlan,
    /// Inactive organizations deny every scoped permission check.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Organization {
    /// Creates a new active organization.
    #[must_use]
    pub fn new(
        slug: OrganizationSlug,
        name: NonEmptyString,
        plan: SubscriptionPlan,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrganizationId::new(),
            slug,
            name,
            plan,
            is_active: true,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OrganizationSlug, PlanLimits, SubscriptionPlan};

    #[test]
    fn slug_accepts_lowercase_digits_and_hyphens() {
        assert!(OrganizationSlug::new("acme-2").is_ok());
    }

    #[test]
    fn slug_rejects_uppercase_and_symbols() {
        assert!(OrganizationSlug::new("Acme").is_err());
        assert!(OrganizationSlug::new("acme_co").is_err());
        assert!(OrganizationSlug::new("").is_err());
    }

    #[test]
    fn slug_rejects_edge_hyphens() {
        assert!(OrganizationSlug::new("-acme").is_err());
        assert!(OrganizationSlug::new("acme-").is_err());
    }

    #[test]
    fn enterprise_plan_is_unlimited() {
        let limits = SubscriptionPlan::Enterprise.limits();
        assert_eq!(limits.max_users, PlanLimits::UNLIMITED);
        assert!(limits.allows_users(1_000_000));
    }

    #[test]
    fn free_plan_caps_members() {
        let limits = SubscriptionPlan::Free.limits();
        assert!(limits.allows_users(5));
        assert!(!limits.allows_users(6));
    }
}
