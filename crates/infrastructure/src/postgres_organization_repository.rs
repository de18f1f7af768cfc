use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_application::OrganizationRepository;
use warden_core::{AppError, AppResult, NonEmptyString, OrganizationId};
use warden_domain::{Organization, OrganizationSlug};

use crate::postgres_support::{decode_stored, is_unique_violation, storage_error};

/// PostgreSQL-backed organization repository.
#[derive(Clone)]
pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OrganizationRow {
    id: Uuid,
    slug: String,
    name: String,
    plan: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl OrganizationRow {
    fn into_organization(self) -> AppResult<Organization> {
        let slug = OrganizationSlug::new(self.slug).map_err(|error| {
            AppError::Internal(format!("failed to decode organization slug: {error}"))
        })?;
        let name = NonEmptyString::new(self.name).map_err(|error| {
            AppError::Internal(format!("failed to decode organization name: {error}"))
        })?;

        Ok(Organization {
            id: OrganizationId::from_uuid(self.id),
            slug,
            name,
            plan: decode_stored("subscription plan", &self.plan)?,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

const ORGANIZATION_COLUMNS: &str = "id, slug, name, plan, is_active, created_at";

#[async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    async fn find_organization(&self, id: OrganizationId) -> AppResult<Option<Organization>> {
        sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load organization", error))?
        .map(OrganizationRow::into_organization)
        .transpose()
    }

    async fn find_organizations(&self, ids: &[OrganizationId]) -> AppResult<Vec<Organization>> {
        let ids: Vec<Uuid> = ids.iter().map(OrganizationId::as_uuid).collect();
        sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("load organizations", error))?
        .into_iter()
        .map(OrganizationRow::into_organization)
        .collect()
    }

    async fn list_organizations(&self) -> AppResult<Vec<Organization>> {
        sqlx::query_as::<_, OrganizationRow>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list organizations", error))?
        .into_iter()
        .map(OrganizationRow::into_organization)
        .collect()
    }

    async fn create_organization(&self, organization: Organization) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO organizations (id, slug, name, plan, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(organization.id.as_uuid())
        .bind(organization.slug.as_str())
        .bind(organization.name.as_str())
        .bind(organization.plan.as_str())
        .bind(organization.is_active)
        .bind(organization.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(format!(
                "organization slug '{}' is already taken",
                organization.slug.as_str()
            ))),
            Err(error) => Err(storage_error("create organization", error)),
        }
    }

    async fn set_organization_active(
        &self,
        id: OrganizationId,
        is_active: bool,
    ) -> AppResult<Organization> {
        sqlx::query_as::<_, OrganizationRow>(&format!(
            "UPDATE organizations SET is_active = $2 WHERE id = $1 RETURNING {ORGANIZATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("update organization", error))?
        .ok_or_else(|| AppError::NotFound(format!("organization '{id}' does not exist")))?
        .into_organization()
    }
}
