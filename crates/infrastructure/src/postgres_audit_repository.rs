use async_trait::async_trait;
use sqlx::PgPool;

use warden_application::{AuditEvent, AuditRepository};
use warden_core::AppResult;

use crate::postgres_support::storage_error;

/// PostgreSQL-backed append-only audit repository.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                id,
                actor_id,
                organization_id,
                action,
                severity,
                resource_type,
                resource_id,
                old_value,
                new_value,
                ip_address,
                user_agent,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.actor_id.map(|id| id.as_uuid()))
        .bind(event.organization_id.map(|id| id.as_uuid()))
        .bind(event.action.as_str())
        .bind(event.severity().as_str())
        .bind(event.resource_type)
        .bind(event.resource_id)
        .bind(event.old_value)
        .bind(event.new_value)
        .bind(event.ip_address)
        .bind(event.user_agent)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|error| storage_error("append audit event", error))?;

        Ok(())
    }
}
