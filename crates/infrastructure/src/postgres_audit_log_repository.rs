use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_application::{AuditEvent, AuditEventId, AuditLogQuery, AuditLogRepository};
use warden_core::{AppResult, OrganizationId, PrincipalId};

use crate::postgres_support::{decode_stored, storage_error};

/// PostgreSQL-backed repository for audit log read models.
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEventRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    organization_id: Option<Uuid>,
    action: String,
    resource_type: String,
    resource_id: String,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    occurred_at: DateTime<Utc>,
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn list_events(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEvent>> {
        let capped_limit = i64::try_from(query.limit.clamp(1, 200)).unwrap_or(200);
        let capped_offset = i64::try_from(query.offset.min(5_000)).unwrap_or(5_000);

        let rows = sqlx::query_as::<_, AuditEventRow>(
            r#"
            SELECT
                id,
                actor_id,
                organization_id,
                action,
                resource_type,
                resource_id,
                old_value,
                new_value,
                ip_address,
                user_agent,
                occurred_at
            FROM audit_events
            WHERE ($1::TEXT IS NULL OR action = $1)
                AND ($2::UUID IS NULL OR actor_id = $2)
                AND ($3::UUID IS NULL OR organization_id = $3)
            ORDER BY occurred_at DESC
            LIMIT $4
            OFFSET $5
            "#,
        )
        .bind(query.action.map(|action| action.as_str()))
        .bind(query.actor_id.map(|id| id.as_uuid()))
        .bind(query.organization_id.map(|id| id.as_uuid()))
        .bind(capped_limit)
        .bind(capped_offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| storage_error("list audit events", error))?;

        rows.into_iter()
            .map(|row| {
                Ok(AuditEvent {
                    id: AuditEventId::from_uuid(row.id),
                    actor_id: row.actor_id.map(PrincipalId::from_uuid),
                    organization_id: row.organization_id.map(OrganizationId::from_uuid),
                    action: decode_stored("audit action", &row.action)?,
                    resource_type: row.resource_type,
                    resource_id: row.resource_id,
                    old_value: row.old_value,
                    new_value: row.new_value,
                    ip_address: row.ip_address,
                    user_agent: row.user_agent,
                    occurred_at: row.occurred_at,
                })
            })
            .collect()
    }
}
