//! MIME message construction.
//!
//! All attachment files are read here, before any connection is opened.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use super::MailError;
use crate::domain::OutboundMessage;

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Attachment filename: the path's basename.
pub fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

/// Build the message: plain-text body first, then one octet-stream part per
/// attachment, in list order.
pub fn build_message(msg: &OutboundMessage) -> Result<Message, MailError> {
    if msg.recipients.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(mailbox(&msg.username)?)
        .subject(msg.subject.as_str());
    for to in &msg.recipients {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &msg.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &msg.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }

    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|e| MailError::Compose(e.to_string()))?;

    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(msg.body.clone()));
    for path in &msg.attachments {
        let data = std::fs::read(path).map_err(|source| MailError::AttachmentRead {
            path: path.clone(),
            source,
        })?;
        body = body.singlepart(Attachment::new(attachment_name(path)).body(data, octet_stream.clone()));
    }

    builder
        .multipart(body)
        .map_err(|e| MailError::Compose(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn message(attachments: Vec<PathBuf>) -> OutboundMessage {
        OutboundMessage {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "bot@example.com".into(),
            password: "secret".into(),
            recipients: vec!["desk@example.com".into()],
            cc: vec!["risk@example.com".into()],
            bcc: vec!["audit@example.com".into()],
            subject: "Daily Report".into(),
            body: "See attached.".into(),
            attachments,
        }
    }

    #[test]
    fn headers_and_envelope() {
        let built = build_message(&message(vec![])).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();

        assert!(raw.contains("Subject: Daily Report"));
        assert!(raw.contains("From: bot@example.com"));
        assert!(raw.contains("To: desk@example.com"));
        assert!(raw.contains("Cc: risk@example.com"));
        assert!(!raw.contains("audit@example.com"), "bcc must not leak into headers");

        let rcpts: Vec<String> = built.envelope().to().iter().map(|a| a.to_string()).collect();
        assert!(rcpts.contains(&"audit@example.com".to_string()));
        assert_eq!(rcpts.len(), 3);
    }

    #[test]
    fn attachments_are_named_after_basenames() {
        let dir = tempfile::tempdir().unwrap();
        let xlsx = dir.path().join("report.xlsx");
        let png = dir.path().join("report.png");
        std::fs::write(&xlsx, b"PK\x03\x04").unwrap();
        std::fs::write(&png, b"\x89PNG").unwrap();

        let built = build_message(&message(vec![xlsx, png])).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();

        assert!(raw.contains("filename=\"report.xlsx\""));
        assert!(raw.contains("filename=\"report.png\""));
        assert_eq!(raw.matches("application/octet-stream").count(), 2);
    }

    #[test]
    fn unreadable_attachment_is_reported() {
        let err = build_message(&message(vec![PathBuf::from("/no/such/report.xlsx")])).unwrap_err();
        assert!(matches!(err, MailError::AttachmentRead { .. }));
    }

    #[test]
    fn bad_addresses_and_empty_recipients() {
        let mut msg = message(vec![]);
        msg.recipients = vec!["not an address".into()];
        assert!(matches!(build_message(&msg), Err(MailError::InvalidAddress { .. })));

        msg.recipients.clear();
        assert!(matches!(build_message(&msg), Err(MailError::NoRecipients)));
    }
}
