//! MIME composition and SMTP dispatch
//!
//! Builds one multipart message per recipient group and hands it to a
//! [`MailTransport`]. The real transport is lettre over STARTTLS; the mock
//! records messages so pipeline tests can verify dispatch behavior without
//! an SMTP server.

use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One email built for a recipient group; fire-and-forget.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub subject: String,
    pub from: String,
    /// Raw recipient key: a comma-separated address list. Trimmed into
    /// individual addresses only at send time.
    pub to: String,
    pub body_text: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Split a recipient key on commas, trim whitespace, drop empty entries.
///
/// The trimmed list (not the raw header string) is what reaches the
/// transport, so stray whitespace in a destination spec cannot leak into
/// addressing.
pub fn resolve_recipients(recipient_key: &str) -> Vec<String> {
    recipient_key
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outbound mail delivery.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// SMTP transport: STARTTLS relay with credential login. One connection
/// pool lives for the whole run, so all groups go out over one session.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        login: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| Error::Dispatch(format!("Invalid SMTP relay '{host}': {e}")))?
            .port(port)
            .credentials(Credentials::new(login.to_string(), password.to_string()))
            .timeout(Some(timeout))
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let email = compose(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| Error::Dispatch(format!("SMTP send to '{}' failed: {e}", message.to)))?;
        Ok(())
    }
}

/// Build the MIME message: a plain-text part plus an optional
/// base64-encoded CSV attachment.
fn compose(message: &OutboundMessage) -> Result<Message> {
    let recipients = resolve_recipients(&message.to);
    if recipients.is_empty() {
        return Err(Error::Dispatch(format!(
            "Recipient key '{}' resolves to no addresses",
            message.to
        )));
    }

    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| Error::Dispatch(format!("Invalid sender address '{}': {e}", message.from)))?;

    let mut builder = Message::builder().from(from).subject(message.subject.clone());
    for recipient in &recipients {
        let mailbox: Mailbox = recipient.parse().map_err(|e| {
            Error::Dispatch(format!("Invalid recipient address '{recipient}': {e}"))
        })?;
        builder = builder.to(mailbox);
    }

    let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(message.body_text.clone()));
    if let Some(attachment) = &message.attachment {
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| Error::Internal(format!("Bad attachment content type: {e}")))?;
        // Force base64: CSV bytes are mostly ASCII, so content sniffing
        // would otherwise pick 7bit and receivers expecting an encoded
        // octet-stream part would see a bare one.
        let body = Body::new_with_encoding(attachment.bytes.clone(), ContentTransferEncoding::Base64)
            .map_err(|_| Error::Internal("Attachment cannot be base64 encoded".to_string()))?;
        multipart = multipart.singlepart(
            lettre::message::Attachment::new(attachment.filename.clone())
                .body(body, content_type),
        );
    }

    builder
        .multipart(multipart)
        .map_err(|e| Error::Dispatch(format!("Failed to build message: {e}")))
}

/// Mock transport recording sent messages, for tests.
#[derive(Default)]
pub struct MockMailTransport {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    fail_for: Arc<Mutex<Vec<String>>>,
}

impl MockMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends whose recipient key matches fail with a dispatch error.
    pub async fn fail_for(&self, recipient_key: &str) {
        self.fail_for.lock().await.push(recipient_key.to_string());
    }

    /// Messages accepted so far, for verification.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MockMailTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.fail_for.lock().await.iter().any(|k| k == &message.to) {
            return Err(Error::Dispatch(format!(
                "mock transport rejected '{}'",
                message.to
            )));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str, attachment: Option<Attachment>) -> OutboundMessage {
        OutboundMessage {
            subject: "Query results CSV".to_string(),
            from: "reports@example.com".to_string(),
            to: to.to_string(),
            body_text: "See attached CSV.".to_string(),
            attachment,
        }
    }

    #[test]
    fn recipients_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            resolve_recipients("a@x.com, b@x.com"),
            vec!["a@x.com", "b@x.com"]
        );
        assert_eq!(
            resolve_recipients("  a@x.com ,, b@x.com ,"),
            vec!["a@x.com", "b@x.com"]
        );
        assert!(resolve_recipients(" , ").is_empty());
    }

    #[test]
    fn composes_multipart_with_attachment() {
        let attachment = Attachment {
            filename: "query_42_results.csv".to_string(),
            bytes: b"n,s\r\n3,\"x\"\r\n".to_vec(),
        };
        let email = compose(&message("a@x.com, b@x.com", Some(attachment))).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains("Subject: Query results CSV"));
        assert!(formatted.contains("To: a@x.com, b@x.com"));
        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("Content-Disposition: attachment"));
        assert!(formatted.contains("query_42_results.csv"));
        assert!(formatted.contains("Content-Transfer-Encoding: base64"));
        // The CSV bytes must ride base64-encoded, never as bare text,
        // even though they are plain ASCII.
        assert!(!formatted.contains("n,s\r\n3"));
        assert!(formatted.contains("bixzDQozLCJ4Ig0K"));
    }

    #[test]
    fn composes_plain_body_without_attachment() {
        let email = compose(&message("a@x.com", None)).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();
        assert!(formatted.contains("See attached CSV."));
        assert!(!formatted.contains("Content-Disposition: attachment"));
    }

    #[test]
    fn invalid_recipient_is_a_dispatch_error() {
        let err = compose(&message("not-an-address", None)).unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }

    #[test]
    fn empty_recipient_key_is_a_dispatch_error() {
        let err = compose(&message(" , ", None)).unwrap_err();
        assert!(err.to_string().contains("no addresses"));
    }
}
