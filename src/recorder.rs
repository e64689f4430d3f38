//! Communication recorder — ties the mail pipeline to the store.
//!
//! Inbound: webhook payload → normalize → token lookup → quote-strip →
//! one persisted inbound communication. Outbound: staff message → SMTP
//! delivery with threading headers → one persisted outbound communication.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::attachments::AttachmentStore;
use crate::error::{DatabaseError, Error};
use crate::mail::normalize::{self, InboundPayload};
use crate::mail::outbound::{Mailer, OutboundEmail, new_message_id};
use crate::mail::strip::extract_reply_text;
use crate::mail::token::{decode_reply_token, encode_reply_token, reply_address};
use crate::store::{Direction, OrderCommunication, Store};

/// Result of processing one inbound webhook call.
///
/// Every variant is acknowledged to the provider with HTTP 200 — rejections
/// are normal outcomes (stale tokens, non-reply mail), not retryable errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// No "to" address survived normalization.
    MissingToAddress,
    /// The "to" address carries no `order-<slug>@` reply address.
    UnrecognizedToken,
    /// No outbound communication matches the token (stale or spoofed).
    CommunicationNotFound,
    /// The matched communication's order no longer exists.
    OrderNotFound,
    /// A new inbound communication was recorded.
    Recorded { communication_id: Uuid },
}

impl InboundOutcome {
    /// Acknowledgment text returned to the provider.
    pub fn ack_message(&self) -> &'static str {
        match self {
            Self::MissingToAddress => "Missing recipient address",
            Self::UnrecognizedToken => "Not an order reply address",
            Self::CommunicationNotFound => "No matching communication",
            Self::OrderNotFound => "Order not found",
            Self::Recorded { .. } => "Reply received",
        }
    }
}

/// Orchestrates recording of inbound and outbound order communications.
pub struct Recorder {
    store: Arc<dyn Store>,
    attachments: Arc<AttachmentStore>,
    inbound_domain: String,
    mailer: Option<Mailer>,
}

impl Recorder {
    pub fn new(
        store: Arc<dyn Store>,
        attachments: Arc<AttachmentStore>,
        inbound_domain: String,
        mailer: Option<Mailer>,
    ) -> Self {
        Self {
            store,
            attachments,
            inbound_domain,
            mailer,
        }
    }

    /// Process one inbound webhook payload.
    ///
    /// Rejections are returned as outcomes; `Err` is reserved for unexpected
    /// internal failures. The route layer acknowledges both with HTTP 200.
    pub async fn handle_inbound(&self, payload: InboundPayload) -> Result<InboundOutcome, Error> {
        let email = normalize::normalize(payload, &self.attachments).await;

        let Some(to) = email.to else {
            warn!("Inbound email has no recipient address; dropping");
            return Ok(InboundOutcome::MissingToAddress);
        };

        let Some(token) = decode_reply_token(&to) else {
            info!(to = %to, "Inbound email is not addressed to an order reply address");
            return Ok(InboundOutcome::UnrecognizedToken);
        };

        let Some(original) = self.store.get_communication_by_reply_token(&token).await? else {
            warn!(token = %token, "No outbound communication matches reply token");
            return Ok(InboundOutcome::CommunicationNotFound);
        };

        let Some(order) = self.store.get_order(original.order_id).await? else {
            warn!(order_id = %original.order_id, "Reply matched a communication whose order is gone");
            return Ok(InboundOutcome::OrderNotFound);
        };

        let body = extract_reply_text(email.text.as_deref(), email.html.as_deref());
        let subject = match email.subject {
            Some(s) if !s.trim().is_empty() => s,
            _ => format!("Re: {}", original.subject),
        };

        let comm = OrderCommunication {
            id: Uuid::new_v4(),
            order_id: order.id,
            direction: Direction::Inbound,
            admin_id: None,
            sender_email: email.from.unwrap_or_default(),
            recipient_email: to,
            subject,
            body,
            reply_to_token: token,
            attachments: email.attachments,
            message_id: None,
            read_by_admin: false,
            created_at: Utc::now(),
        };
        self.store.insert_communication(&comm).await?;

        info!(
            communication_id = %comm.id,
            order_id = %order.id,
            attachments = comm.attachments.len(),
            "Inbound reply recorded"
        );
        Ok(InboundOutcome::Recorded {
            communication_id: comm.id,
        })
    }

    /// Send a staff message for an order and record the outbound communication.
    ///
    /// With no SMTP configured the row is still recorded (useful in dev).
    /// A delivery failure is an error and nothing is recorded.
    pub async fn send_outbound(
        &self,
        order_id: Uuid,
        admin_id: Option<String>,
        subject: String,
        body: String,
    ) -> Result<OrderCommunication, Error> {
        let Some(order) = self.store.get_order(order_id).await? else {
            return Err(DatabaseError::NotFound {
                entity: "order".into(),
                id: order_id.to_string(),
            }
            .into());
        };

        let token = encode_reply_token(order.id);
        let message_id = new_message_id(&self.inbound_domain);
        let in_reply_to = self.last_message_id(order_id).await?;

        let email = OutboundEmail {
            to: order.customer_email.clone(),
            reply_to: reply_address(order.id, &self.inbound_domain),
            subject: subject.clone(),
            body: body.clone(),
            message_id: message_id.clone(),
            in_reply_to,
        };

        match &self.mailer {
            Some(mailer) => mailer.send(&email)?,
            None => warn!(to = %email.to, "SMTP not configured; recording without delivery"),
        }

        let comm = OrderCommunication {
            id: Uuid::new_v4(),
            order_id: order.id,
            direction: Direction::Outbound,
            admin_id,
            sender_email: email.reply_to.clone(),
            recipient_email: order.customer_email,
            subject,
            body,
            reply_to_token: token,
            attachments: Vec::new(),
            message_id: Some(message_id),
            read_by_admin: true,
            created_at: Utc::now(),
        };
        self.store.insert_communication(&comm).await?;

        info!(
            communication_id = %comm.id,
            order_id = %order.id,
            "Outbound message recorded"
        );
        Ok(comm)
    }

    /// Message-ID of the newest communication in the order's thread, for
    /// `In-Reply-To`/`References` headers.
    async fn last_message_id(&self, order_id: Uuid) -> Result<Option<String>, Error> {
        let thread = self.store.list_communications(order_id).await?;
        Ok(thread
            .into_iter()
            .rev()
            .find_map(|c| c.message_id))
    }
}
