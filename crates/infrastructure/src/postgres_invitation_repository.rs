use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_application::{
    AcceptanceOutcome, InvitationAcceptance, InvitationRepository, resolve_acceptance,
};
use warden_core::{AppError, AppResult, OrganizationId, PrincipalId};
use warden_domain::{EmailAddress, Invitation, InvitationId, InvitationStatus};

use crate::postgres_role_assignment_repository::{lock_scope_assignment, write_grant};
use crate::postgres_support::{decode_stored, is_unique_violation, storage_error};

/// PostgreSQL-backed invitation repository.
///
/// Acceptance writes the invitation and the role assignment in one
/// transaction, so it needs access to `role_assignments` as well.
#[derive(Clone)]
pub struct PostgresInvitationRepository {
    pool: PgPool,
}

impl PostgresInvitationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct InvitationRow {
    id: Uuid,
    email: String,
    organization_id: Uuid,
    role_kind: String,
    invited_by: Uuid,
    token_hash: String,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    accepted_by: Option<Uuid>,
}

impl InvitationRow {
    fn into_invitation(self) -> AppResult<Invitation> {
        let email = EmailAddress::new(self.email).map_err(|error| {
            AppError::Internal(format!("failed to decode invitation email: {error}"))
        })?;

        Ok(Invitation {
            id: InvitationId::from_uuid(self.id),
            email,
            organization_id: OrganizationId::from_uuid(self.organization_id),
            role_kind: decode_stored("role kind", &self.role_kind)?,
            invited_by: PrincipalId::from_uuid(self.invited_by),
            token_hash: self.token_hash,
            status: decode_stored("invitation status", &self.status)?,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            accepted_at: self.accepted_at,
            accepted_by: self.accepted_by.map(PrincipalId::from_uuid),
        })
    }
}

const INVITATION_COLUMNS: &str = "id, email, organization_id, role_kind, invited_by, token_hash, \
     status, expires_at, created_at, updated_at, accepted_at, accepted_by";

const OPEN_STATUSES: &str = "('pending', 'expired')";

#[async_trait]
impl InvitationRepository for PostgresInvitationRepository {
    async fn find_invitation(&self, id: InvitationId) -> AppResult<Option<Invitation>> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load invitation", error))?
        .map(InvitationRow::into_invitation)
        .transpose()
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Invitation>> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load invitation by token", error))?
        .map(InvitationRow::into_invitation)
        .transpose()
    }

    async fn find_open(
        &self,
        email: &EmailAddress,
        organization_id: OrganizationId,
    ) -> AppResult<Option<Invitation>> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             WHERE email = $1 AND organization_id = $2 AND status IN {OPEN_STATUSES}"
        ))
        .bind(email.as_str())
        .bind(organization_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("load open invitation", error))?
        .map(InvitationRow::into_invitation)
        .transpose()
    }

    async fn list_for_organization(
        &self,
        organization_id: OrganizationId,
    ) -> AppResult<Vec<Invitation>> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations \
             WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list invitations", error))?
        .into_iter()
        .map(InvitationRow::into_invitation)
        .collect()
    }

    async fn save_open(&self, invitation: &Invitation) -> AppResult<()> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| storage_error("begin invitation save", error))?;

        let stored_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM invitations WHERE id = $1 FOR UPDATE")
                .bind(invitation.id.as_uuid())
                .fetch_optional(&mut *transaction)
                .await
                .map_err(|error| storage_error("lock invitation", error))?;

        let result = match stored_status {
            Some(status) => {
                let status: InvitationStatus = decode_stored("invitation status", &status)?;
                if status.is_terminal() {
                    return Err(AppError::InvitationAlreadyProcessed(format!(
                        "invitation '{}' is already {}",
                        invitation.id,
                        status.as_str()
                    )));
                }

                sqlx::query(
                    r#"
                    UPDATE invitations
                    SET role_kind = $2,
                        invited_by = $3,
                        token_hash = $4,
                        status = $5,
                        expires_at = $6,
                        updated_at = $7
                    WHERE id = $1
                    "#,
                )
                .bind(invitation.id.as_uuid())
                .bind(invitation.role_kind.as_str())
                .bind(invitation.invited_by.as_uuid())
                .bind(invitation.token_hash.as_str())
                .bind(invitation.status.as_str())
                .bind(invitation.expires_at)
                .bind(invitation.updated_at)
                .execute(&mut *transaction)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO invitations (
                        id, email, organization_id, role_kind, invited_by, token_hash,
                        status, expires_at, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(invitation.id.as_uuid())
                .bind(invitation.email.as_str())
                .bind(invitation.organization_id.as_uuid())
                .bind(invitation.role_kind.as_str())
                .bind(invitation.invited_by.as_uuid())
                .bind(invitation.token_hash.as_str())
                .bind(invitation.status.as_str())
                .bind(invitation.expires_at)
                .bind(invitation.created_at)
                .bind(invitation.updated_at)
                .execute(&mut *transaction)
                .await
            }
        };

        match result {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                return Err(AppError::Conflict(format!(
                    "an open invitation for '{}' already exists",
                    invitation.email
                )));
            }
            Err(error) => return Err(storage_error("save invitation", error)),
        }

        transaction
            .commit()
            .await
            .map_err(|error| storage_error("commit invitation save", error))
    }

    async fn revoke(&self, id: InvitationId, revoked_at: DateTime<Utc>) -> AppResult<Invitation> {
        let revoked = sqlx::query_as::<_, InvitationRow>(&format!(
            "UPDATE invitations SET status = 'revoked', updated_at = $2 \
             WHERE id = $1 AND status IN {OPEN_STATUSES} \
             RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(revoked_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| storage_error("revoke invitation", error))?;

        if let Some(row) = revoked {
            return row.into_invitation();
        }

        match self.find_invitation(id).await? {
            Some(invitation) => Err(AppError::InvitationAlreadyProcessed(format!(
                "invitation '{id}' is already {}",
                invitation.status.as_str()
            ))),
            None => Err(AppError::NotFound(format!("invitation '{id}' does not exist"))),
        }
    }

    async fn complete_acceptance(
        &self,
        acceptance: InvitationAcceptance,
    ) -> AppResult<AcceptanceOutcome> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| storage_error("begin invitation acceptance", error))?;

        let invitation = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1 FOR UPDATE"
        ))
        .bind(acceptance.invitation_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| storage_error("lock invitation", error))?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "invitation '{}' does not exist",
                acceptance.invitation_id
            ))
        })?
        .into_invitation()?;

        let existing = lock_scope_assignment(
            &mut transaction,
            acceptance.principal_id,
            Some(invitation.organization_id),
        )
        .await?;

        let outcome = resolve_acceptance(invitation, existing, &acceptance)?;
        write_grant(&mut transaction, &outcome.grant).await?;

        let updated = sqlx::query(
            r#"
            UPDATE invitations
            SET status = 'accepted', accepted_at = $2, accepted_by = $3, updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(acceptance.invitation_id.as_uuid())
        .bind(acceptance.accepted_at)
        .bind(acceptance.principal_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| storage_error("accept invitation", error))?;

        if updated.rows_affected() != 1 {
            return Err(AppError::InvitationAlreadyProcessed(format!(
                "invitation '{}' was processed concurrently",
                acceptance.invitation_id
            )));
        }

        transaction
            .commit()
            .await
            .map_err(|error| storage_error("commit invitation acceptance", error))?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
