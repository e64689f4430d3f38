//! Inbound email normalization — webhook payload to a canonical record.
//!
//! The mail provider posts either pre-split fields (`to`, `from`, `subject`,
//! `text`, `html`) or the raw MIME source (field `email`), depending on how
//! the inbound-parse hook is configured. Both shapes normalize to the same
//! record; direct fields win where both are present.

use mail_parser::{MessageParser, MimeHeaders};
use serde::Deserialize;
use tracing::warn;

use crate::attachments::AttachmentStore;
use crate::store::AttachmentRef;

/// Raw webhook payload, as posted by the inbound-parse provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundPayload {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    /// Envelope JSON as posted by the provider. Unused, but kept so
    /// form deserialization accepts the full provider payload.
    pub envelope: Option<String>,
    /// Raw MIME source, present when the hook is configured to forward it.
    #[serde(rename = "email")]
    pub raw_email: Option<String>,
}

/// Canonical inbound email record.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEmail {
    pub to: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

/// Normalize a webhook payload, persisting any MIME attachments.
///
/// A MIME parse failure degrades to whatever direct fields were present; a
/// failed attachment write is logged and skipped without aborting the rest.
pub async fn normalize(payload: InboundPayload, attachments: &AttachmentStore) -> NormalizedEmail {
    let mut email = NormalizedEmail {
        to: filled(payload.to),
        from: filled(payload.from),
        subject: filled(payload.subject),
        text: filled(payload.text),
        html: filled(payload.html),
        attachments: Vec::new(),
    };

    let Some(raw) = payload.raw_email else {
        return email;
    };

    let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) else {
        warn!("Failed to parse raw MIME payload; continuing with direct fields");
        return email;
    };

    if email.to.is_none() {
        email.to = address_list(parsed.to());
    }
    if email.from.is_none() {
        email.from = address_list(parsed.from());
    }
    if email.subject.is_none() {
        email.subject = filled(parsed.subject().map(str::to_string));
    }
    if email.text.is_none() {
        email.text = filled(parsed.body_text(0).map(|t| t.to_string()));
    }
    if email.html.is_none() {
        email.html = filled(parsed.body_html(0).map(|h| h.to_string()));
    }

    for part in parsed.attachments() {
        let name = part.attachment_name().unwrap_or("attachment");
        let mime_type = content_type_of(part);
        match attachments.save(name, &mime_type, part.contents()).await {
            Ok(saved) => email.attachments.push(saved),
            Err(e) => {
                warn!(name = name, error = %e, "Failed to save attachment; skipping");
            }
        }
    }

    email
}

/// Treat empty/whitespace-only form fields as absent.
fn filled(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Join all addresses in a parsed header into one comma-separated value.
fn address_list(addr: Option<&mail_parser::Address>) -> Option<String> {
    let addr = addr?;
    let list: Vec<String> = match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    };
    if list.is_empty() {
        None
    } else {
        Some(list.join(", "))
    }
}

/// Full `type/subtype` of a MIME part, defaulting to octet-stream.
fn content_type_of(part: &mail_parser::MessagePart) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{sub}", ct.ctype()),
            None => ct.ctype().to_string(),
        },
        None => "application/octet-stream".to_string(),
    }
}
