//! Development email service that writes invitation emails to the log.

use async_trait::async_trait;
use tracing::info;
use warden_application::EmailService;
use warden_core::AppResult;

/// Email service that logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct ConsoleEmailService;

impl ConsoleEmailService {
    /// Creates a console email service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        _html_body: Option<&str>,
    ) -> AppResult<()> {
        info!(to, subject, body = text_body, "email not delivered (console provider)");
        Ok(())
    }
}
