use async_trait::async_trait;
use tracing::info;

use super::{Notifier, NotifyError};

/// Logs notifications instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_app(
        &self,
        user_key: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        info!(channel = "app", user_key, subject, body, "notification not sent, no provider");
        Ok(())
    }

    async fn send_sms(&self, phone: &str, body: &str) -> Result<(), NotifyError> {
        info!(channel = "sms", phone, body, "notification not sent, no provider");
        Ok(())
    }

    async fn send_email(
        &self,
        sender_name: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        info!(
            channel = "email",
            sender_name, to, subject, body, "notification not sent, no provider"
        );
        Ok(())
    }
}
