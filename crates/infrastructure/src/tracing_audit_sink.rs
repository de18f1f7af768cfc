use async_trait::async_trait;
use tracing::error;

use warden_application::{AuditEvent, AuditRepository};
use warden_core::{AppError, AppResult};

/// Secondary audit sink that writes events to the structured log.
///
/// Used only when the primary repository rejects a write, so every event is
/// logged at `error`.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Creates the sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditRepository for TracingAuditSink {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event).map_err(|serialize_error| {
            AppError::Internal(format!("failed to serialize audit event: {serialize_error}"))
        })?;

        error!(
            audit_event_id = %event.id,
            action = event.action.as_str(),
            severity = event.severity().as_str(),
            actor_id = ?event.actor_id.map(|id| id.to_string()),
            organization_id = ?event.organization_id.map(|id| id.to_string()),
            resource_type = event.resource_type.as_str(),
            resource_id = event.resource_id.as_str(),
            payload = payload.as_str(),
            "audit event written to fallback sink"
        );

        Ok(())
    }
}
