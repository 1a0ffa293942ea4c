use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::utils::error::AppError;

/// Outbound transactional email. Delivery is best-effort everywhere it is
/// used: callers log failures and move on, the owning operation's outcome
/// never depends on it.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: Value,
    ) -> Result<(), AppError>;
}

/// Logs every send instead of talking to a provider. The production
/// deployment swaps this for a real SMTP/API-backed implementation behind
/// the same trait.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: Value,
    ) -> Result<(), AppError> {
        tracing::info!(%to, %subject, %template, %context, "sending email");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: Value,
}

/// Records sends for assertions in tests.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mailer state poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: Value,
    ) -> Result<(), AppError> {
        self.sent
            .lock()
            .expect("mailer state poisoned")
            .push(SentMail {
                to: to.to_string(),
                subject: subject.to_string(),
                template: template.to_string(),
                context,
            });
        Ok(())
    }
}
