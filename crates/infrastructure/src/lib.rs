//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_email_service;
mod http_identity_provider;
mod in_memory_identity_provider;
mod in_memory_store;
mod postgres_audit_log_repository;
mod postgres_audit_repository;
mod postgres_invitation_repository;
mod postgres_organization_repository;
mod postgres_role_assignment_repository;
mod postgres_support;
mod smtp_email_service;
mod tracing_audit_sink;

pub use console_email_service::ConsoleEmailService;
pub use http_identity_provider::HttpIdentityProvider;
pub use in_memory_identity_provider::InMemoryIdentityProvider;
pub use in_memory_store::InMemoryStore;
pub use postgres_audit_log_repository::PostgresAuditLogRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_invitation_repository::PostgresInvitationRepository;
pub use postgres_organization_repository::PostgresOrganizationRepository;
pub use postgres_role_assignment_repository::PostgresRoleAssignmentRepository;
pub use smtp_email_service::{SmtpEmailConfig, SmtpEmailService};
pub use tracing_audit_sink::TracingAuditSink;
