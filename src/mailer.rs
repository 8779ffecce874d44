// src/mailer.rs
//
// Outbound mail. The workflow hands fully rendered messages to a `Mailer`;
// callers treat delivery as best-effort.

use async_trait::async_trait;

/// Content id the status template uses to reference the inline QR image.
pub const QR_CONTENT_ID: &str = "appointment-qr";

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
    /// Payload to rasterize as a QR image under `cid:appointment-qr`.
    pub inline_qr: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Transport that writes outgoing mail to the log instead of an SMTP relay.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        if email.to.trim().is_empty() {
            anyhow::bail!("email has no recipient");
        }

        tracing::info!(
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            qr = email.inline_qr.is_some(),
            "outgoing email"
        );
        tracing::debug!(body = %email.html, "email body");
        Ok(())
    }
}
