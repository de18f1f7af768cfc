use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppResult, OrganizationId, PrincipalId};
use warden_domain::{AuditAction, AuditSeverity};

warden_core::uuid_identifier!(
    /// Unique identifier of a stored audit event.
    AuditEventId
);

/// Request attributes captured alongside audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Client address after trusted proxy resolution.
    pub ip_address: Option<String>,
    /// Raw user agent header.
    pub user_agent: Option<String>,
}

/// Immutable audit event emitted by application services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub id: AuditEventId,
    /// Acting principal, absent for anonymous or system actions.
    pub actor_id: Option<PrincipalId>,
    /// Organization scope, absent for system-wide events.
    pub organization_id: Option<OrganizationId>,
    /// Stable action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// State before the change.
    pub old_value: Option<serde_json::Value>,
    /// State after the change or decision details.
    pub new_value: Option<serde_json::Value>,
    /// Client address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Event timestamp.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an event stamped now with a fresh id and no payload.
    #[must_use]
    pub fn new(
        action: AuditAction,
        actor_id: Option<PrincipalId>,
        organization_id: Option<OrganizationId>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: AuditEventId::new(),
            actor_id,
            organization_id,
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attaches before/after payloads.
    #[must_use]
    pub fn with_values(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    /// Attaches request metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &RequestMetadata) -> Self {
        self.ip_address.clone_from(&metadata.ip_address);
        self.user_agent.clone_from(&metadata.user_agent);
        self
    }

    /// Severity derived from the action.
    #[must_use]
    pub fn severity(&self) -> AuditSeverity {
        self.action.severity()
    }
}

/// Port for persisting append-only audit events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}

/// Query parameters for audit log listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditLogQuery {
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for offset pagination.
    pub offset: usize,
    /// Optional action filter.
    pub action: Option<AuditAction>,
    /// Optional actor filter.
    pub actor_id: Option<PrincipalId>,
    /// Optional organization filter.
    pub organization_id: Option<OrganizationId>,
}

/// Read port for audit log views, newest events first.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Lists events matching the query.
    async fn list_events(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEvent>>;
}
