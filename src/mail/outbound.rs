//! Outbound mail — SMTP delivery via lettre with reply threading headers.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::MailError;

/// An outbound order message, ready for delivery.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    /// Synthetic `order-<slug>@<inbound-domain>` address replies come back to.
    pub reply_to: String,
    pub subject: String,
    pub body: String,
    /// Message-ID assigned to this message.
    pub message_id: String,
    /// Message-ID of the previous message in the thread, if any.
    pub in_reply_to: Option<String>,
}

/// Generate a fresh RFC-5322 Message-ID under the given domain.
pub fn new_message_id(domain: &str) -> String {
    format!("<{}@{domain}>", Uuid::new_v4().simple())
}

/// SMTP mailer wrapping the configured relay.
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Send one message via the configured SMTP relay.
    pub fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = build_message(email, &self.config.from_address)?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| MailError::Send(e.to_string()))?;

        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Build the lettre message with reply-to and threading headers.
fn build_message(email: &OutboundEmail, from_address: &str) -> Result<Message, MailError> {
    let parse_mailbox = |addr: &str| {
        addr.parse().map_err(|e| MailError::InvalidAddress {
            address: addr.to_string(),
            reason: format!("{e}"),
        })
    };

    let mut builder = Message::builder()
        .from(parse_mailbox(from_address)?)
        .to(parse_mailbox(&email.to)?)
        .reply_to(parse_mailbox(&email.reply_to)?)
        .subject(email.subject.clone())
        .message_id(Some(email.message_id.clone()));

    if let Some(prev) = &email.in_reply_to {
        builder = builder.in_reply_to(prev.clone()).references(prev.clone());
    }

    builder
        .body(email.body.clone())
        .map_err(|e| MailError::Build(e.to_string()))
}
