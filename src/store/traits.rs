//! `Store` trait and persisted domain types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Direction of a communication relative to the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Customer reply received via the inbound-email webhook.
    Inbound,
    /// Staff message sent to the customer.
    Outbound,
}

/// Descriptor for one saved attachment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// A merchandise order. Only the fields the communication thread needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer_name: &str, customer_email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_name: customer_name.to_string(),
            customer_email: customer_email.to_string(),
            status: "new".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// One message in an order's conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommunication {
    pub id: Uuid,
    pub order_id: Uuid,
    pub direction: Direction,
    /// Staff member who sent an outbound message. Always `None` for inbound.
    pub admin_id: Option<String>,
    pub sender_email: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    /// Token correlating replies to this thread, derived from the order id.
    pub reply_to_token: String,
    pub attachments: Vec<AttachmentRef>,
    /// RFC-5322 Message-ID, set on outbound messages for threading headers.
    pub message_id: Option<String>,
    pub read_by_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence trait for orders and their communications.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Orders ──────────────────────────────────────────────────────

    /// Insert a new order.
    async fn insert_order(&self, order: &Order) -> Result<(), DatabaseError>;

    /// Get an order by id.
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    /// Delete an order. Its communications are removed by cascade.
    /// Returns true if a row was deleted.
    async fn delete_order(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Communications ──────────────────────────────────────────────

    /// Insert a new communication row.
    async fn insert_communication(&self, comm: &OrderCommunication) -> Result<(), DatabaseError>;

    /// Find the most recent outbound communication carrying the given
    /// reply token, i.e. the message a customer replied to.
    async fn get_communication_by_reply_token(
        &self,
        token: &str,
    ) -> Result<Option<OrderCommunication>, DatabaseError>;

    /// All communications for an order, oldest first.
    async fn list_communications(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderCommunication>, DatabaseError>;

    /// Flip a communication's `read_by_admin` flag. Returns true if the row exists.
    async fn mark_communication_read(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Number of unread inbound communications (dashboard badge).
    async fn unread_inbound_count(&self) -> Result<i64, DatabaseError>;
}
