use std::sync::Arc;

use serde_json::json;

use warden_core::{AppError, AppResult, OrganizationId, PrincipalId};
use warden_domain::{AuditAction, Permission};

use crate::{AuditEvent, AuditLogQuery, AuditLogRepository, AuditRepository, RequestMetadata};

/// Guard decision to be written to the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionAudit {
    /// Principal the decision applies to; absent before identity resolution.
    pub principal_id: Option<PrincipalId>,
    /// Organization scope of the check.
    pub organization_id: Option<OrganizationId>,
    /// Permission the route required, if any.
    pub permission: Option<Permission>,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Decision outcome.
    pub allowed: bool,
    /// Machine-readable reason code.
    pub reason: String,
    /// Role that satisfied the check.
    pub matched_role: Option<String>,
    /// Redirect destination for denials.
    pub landing: Option<String>,
    /// Request attributes.
    pub metadata: RequestMetadata,
}

/// Appends audit events with escalation to a secondary sink.
#[derive(Clone)]
pub struct AuditService {
    primary: Arc<dyn AuditRepository>,
    fallback: Arc<dyn AuditRepository>,
    log: Arc<dyn AuditLogRepository>,
    allowed_sample_rate: f64,
}

impl AuditService {
    /// Creates an audit service. `allowed_sample_rate` is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn new(
        primary: Arc<dyn AuditRepository>,
        fallback: Arc<dyn AuditRepository>,
        log: Arc<dyn AuditLogRepository>,
        allowed_sample_rate: f64,
    ) -> Self {
        let allowed_sample_rate = if allowed_sample_rate.is_nan() {
            1.0
        } else {
            allowed_sample_rate.clamp(0.0, 1.0)
        };

        Self {
            primary,
            fallback,
            log,
            allowed_sample_rate,
        }
    }

    /// Appends one event.
    ///
    /// When the primary sink fails, an `audit.write_failed` entry and the
    /// original event go to the fallback sink; the primary error is returned
    /// only if the fallback fails as well.
    pub async fn record(&self, event: AuditEvent) -> AppResult<()> {
        let Err(primary_error) = self.primary.append_event(event.clone()).await else {
            return Ok(());
        };

        let escalation = AuditEvent::new(
            AuditAction::AuditWriteFailed,
            event.actor_id,
            event.organization_id,
            "audit_event",
            event.id.to_string(),
        )
        .with_values(
            None,
            Some(json!({
                "error": primary_error.to_string(),
                "action": event.action.as_str(),
            })),
        );

        let escalated = self.fallback.append_event(escalation).await;
        let preserved = self.fallback.append_event(event).await;

        match (escalated, preserved) {
            (Ok(()), Ok(())) => Ok(()),
            _ => Err(primary_error),
        }
    }

    /// Records a guard decision. Denials are always written; allowed
    /// decisions are sampled.
    pub async fn record_decision(&self, decision: DecisionAudit) -> AppResult<()> {
        if decision.allowed && !self.sample_allowed()? {
            return Ok(());
        }

        let action = if decision.allowed {
            AuditAction::AuthorizationAllowed
        } else {
            AuditAction::AuthorizationDenied
        };

        let event = AuditEvent::new(
            action,
            decision.principal_id,
            decision.organization_id,
            "route",
            decision.path.clone(),
        )
        .with_values(
            None,
            Some(json!({
                "method": decision.method,
                "permission": decision.permission.map(|permission| permission.as_str()),
                "reason": decision.reason,
                "matched_role": decision.matched_role,
                "landing": decision.landing,
            })),
        )
        .with_metadata(&decision.metadata);

        self.record(event).await
    }

    /// Records a guarded request that arrived without a valid session.
    /// Never sampled; stored at low severity.
    pub async fn record_unauthenticated(
        &self,
        method: &str,
        path: &str,
        metadata: &RequestMetadata,
    ) -> AppResult<()> {
        let event = AuditEvent::new(AuditAction::AuthenticationRequired, None, None, "route", path)
            .with_values(
                None,
                Some(json!({
                    "method": method,
                    "reason": "unauthenticated",
                })),
            )
            .with_metadata(metadata);

        self.record(event).await
    }

    /// Lists stored events for administrative views.
    pub async fn list_events(&self, query: AuditLogQuery) -> AppResult<Vec<AuditEvent>> {
        if query.limit == 0 {
            return Err(AppError::Validation(
                "audit log limit must be greater than zero".to_owned(),
            ));
        }

        self.log.list_events(query).await
    }

    fn sample_allowed(&self) -> AppResult<bool> {
        if self.allowed_sample_rate >= 1.0 {
            return Ok(true);
        }
        if self.allowed_sample_rate <= 0.0 {
            return Ok(false);
        }

        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes).map_err(|error| {
            AppError::Internal(format!("failed to sample audit decision: {error}"))
        })?;
        let roll = f64::from(u32::from_le_bytes(bytes)) / f64::from(u32::MAX);

        Ok(roll < self.allowed_sample_rate)
    }
}
