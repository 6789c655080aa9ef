//! Report delivery over authenticated SMTP.

pub mod compose;
pub mod transport;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::domain::OutboundMessage;

pub use compose::{attachment_name, build_message};
pub use transport::{MailSession, MailTransport, SessionGuard, SmtpSession, SmtpTransport};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("cannot read attachment {}: {source}", .path.display())]
    AttachmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("message has no recipients")]
    NoRecipients,

    #[error("failed to build message: {0}")]
    Compose(String),

    #[error("mail server unreachable: {0}")]
    Connection(String),

    #[error("TLS upgrade failed: {0}")]
    Tls(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("delivery failed: {0}")]
    DeliverySend(String),
}

/// Sends [`OutboundMessage`]s through sessions opened by `T`.
pub struct Mailer<T: MailTransport> {
    transport: T,
}

impl<T: MailTransport> Mailer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Compose, then connect, STARTTLS, log in and send. The message is fully
    /// built (attachments read) before the first network call.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        info!(
            recipients = ?message.recipients,
            attachments = message.attachments.len(),
            "sending email"
        );
        let email = build_message(message)?;
        let raw = email.formatted();

        let mut guard = SessionGuard::new(self.transport.connect(&message.smtp_host, message.smtp_port)?);
        guard.session().starttls()?;
        guard.session().login(&message.username, &message.password)?;
        guard.session().send(email.envelope(), &raw)?;
        guard.close()?;

        info!(subject = %message.subject, "email sent");
        Ok(())
    }
}
