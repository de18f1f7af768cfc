use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use warden_application::{GrantOutcome, RoleAssignmentRepository, RoleGrant, resolve_grant};
use warden_core::{AppError, AppResult, OrganizationId, PrincipalId};
use warden_domain::{Permission, RoleAssignment, RoleAssignmentId};

use crate::postgres_support::{decode_stored, is_unique_violation, storage_error};

/// PostgreSQL-backed role assignment repository.
#[derive(Clone)]
pub struct PostgresRoleAssignmentRepository {
    pool: PgPool,
}

impl PostgresRoleAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RoleAssignmentRow {
    id: Uuid,
    principal_id: Uuid,
    role_kind: String,
    organization_id: Option<Uuid>,
    permission_overrides: Vec<String>,
    is_active: bool,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignmentRow {
    pub(crate) fn into_assignment(self) -> AppResult<RoleAssignment> {
        let permission_overrides = self
            .permission_overrides
            .iter()
            .map(|permission| decode_stored::<Permission>("permission", permission))
            .collect::<AppResult<BTreeSet<_>>>()?;

        RoleAssignment::from_parts(
            RoleAssignmentId::from_uuid(self.id),
            PrincipalId::from_uuid(self.principal_id),
            decode_stored("role kind", &self.role_kind)?,
            self.organization_id.map(OrganizationId::from_uuid),
            permission_overrides,
            self.is_active,
            self.assigned_at,
            self.expires_at,
        )
        .map_err(|error| {
            AppError::Internal(format!(
                "stored role assignment '{}' is invalid: {error}",
                self.id
            ))
        })
    }
}

pub(crate) const ASSIGNMENT_COLUMNS: &str = "id, principal_id, role_kind, organization_id, \
     permission_overrides, is_active, assigned_at, expires_at";

/// Locks and loads the single assignment row of a scope inside a transaction.
pub(crate) async fn lock_scope_assignment(
    transaction: &mut Transaction<'_, Postgres>,
    principal_id: PrincipalId,
    organization_id: Option<OrganizationId>,
) -> AppResult<Option<RoleAssignment>> {
    sqlx::query_as::<_, RoleAssignmentRow>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments \
         WHERE principal_id = $1 AND organization_id IS NOT DISTINCT FROM $2 \
         FOR UPDATE"
    ))
    .bind(principal_id.as_uuid())
    .bind(organization_id.map(|id| id.as_uuid()))
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| storage_error("lock role assignment", error))?
    .map(RoleAssignmentRow::into_assignment)
    .transpose()
}

/// Persists the result of [`resolve_grant`] inside a transaction.
pub(crate) async fn write_grant(
    transaction: &mut Transaction<'_, Postgres>,
    outcome: &GrantOutcome,
) -> AppResult<()> {
    let assignment = outcome.assignment();
    let overrides: Vec<&str> = assignment
        .permission_overrides()
        .iter()
        .map(|permission| permission.as_str())
        .collect();

    let result = match outcome {
        GrantOutcome::Created(_) => {
            sqlx::query(
                r#"
                INSERT INTO role_assignments (
                    id, principal_id, role_kind, organization_id,
                    permission_overrides, is_active, assigned_at, expires_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(assignment.id().as_uuid())
            .bind(assignment.principal_id().as_uuid())
            .bind(assignment.role_kind().as_str())
            .bind(assignment.organization_id().map(|id| id.as_uuid()))
            .bind(overrides)
            .bind(assignment.is_active())
            .bind(assignment.assigned_at())
            .bind(assignment.expires_at())
            .execute(&mut **transaction)
            .await
        }
        GrantOutcome::Reactivated { .. } => {
            sqlx::query(
                r#"
                UPDATE role_assignments
                SET role_kind = $2,
                    permission_overrides = $3,
                    is_active = TRUE,
                    assigned_at = $4,
                    expires_at = $5
                WHERE id = $1
                "#,
            )
            .bind(assignment.id().as_uuid())
            .bind(assignment.role_kind().as_str())
            .bind(overrides)
            .bind(assignment.assigned_at())
            .bind(assignment.expires_at())
            .execute(&mut **transaction)
            .await
        }
    };

    match result {
        Ok(_) => Ok(()),
        // A concurrent insert for the same scope won the race.
        Err(error) if is_unique_violation(&error) => Err(AppError::AlreadyMember(format!(
            "principal '{}' already holds a role in this scope",
            assignment.principal_id()
        ))),
        Err(error) => Err(storage_error("write role assignment", error)),
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    async fn list_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> AppResult<Vec<RoleAssignment>> {
        sqlx::query_as::<_, RoleAssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments \
             WHERE principal_id = $1 ORDER BY assigned_at"
        ))
        .bind(principal_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list role assignments", error))?
        .into_iter()
        .map(RoleAssignmentRow::into_assignment)
        .collect()
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<RoleAssignment>> {
        sqlx::query_as::<_, RoleAssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments \
             WHERE organization_id = $1 ORDER BY assigned_at"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list organization members", error))?
        .into_iter()
        .map(RoleAssignmentRow::into_assignment)
        .collect()
    }

    async fn find_assignment(&self, id: RoleAssignmentId) -> AppResult<Option<RoleAssignment>> {
        sqlx::query_as::<_, RoleAssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load role assignment", error))?
        .map(RoleAssignmentRow::into_assignment)
        .transpose()
    }

    async fn grant(&self, grant: RoleGrant) -> AppResult<GrantOutcome> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| storage_error("begin role grant", error))?;

        let existing =
            lock_scope_assignment(&mut transaction, grant.principal_id, grant.organization_id)
                .await?;
        let outcome = resolve_grant(existing, &grant)?;
        write_grant(&mut transaction, &outcome).await?;

        transaction
            .commit()
            .await
            .map_err(|error| storage_error("commit role grant", error))?;

        Ok(outcome)
    }

    async fn deactivate(&self, id: RoleAssignmentId) -> AppResult<RoleAssignment> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| storage_error("begin role revocation", error))?;

        let mut assignment = sqlx::query_as::<_, RoleAssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| storage_error("lock role assignment", error))?
        .ok_or_else(|| AppError::NotFound(format!("role assignment '{id}' does not exist")))?
        .into_assignment()?;

        assignment.deactivate()?;

        sqlx::query("UPDATE role_assignments SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| storage_error("deactivate role assignment", error))?;

        transaction
            .commit()
            .await
            .map_err(|error| storage_error("commit role revocation", error))?;

        Ok(assignment)
    }
}

#[cfg(test)]
mod tests;
