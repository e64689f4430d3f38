//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{AttachmentRef, Direction, Order, OrderCommunication, Store};

const COMM_COLUMNS: &str = "id, order_id, direction, admin_id, sender_email, recipient_email, \
     subject, body, reply_to_token, attachments, message_id, read_by_admin, created_at";

/// libSQL store backend.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_db(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        Self::from_db(db).await
    }

    async fn from_db(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        // Cascading deletes depend on FK enforcement, which is per-connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn direction_to_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Inbound => "inbound",
        Direction::Outbound => "outbound",
    }
}

fn str_to_direction(s: &str) -> Direction {
    match s {
        "outbound" => Direction::Outbound,
        _ => Direction::Inbound,
    }
}

fn column_error(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("Failed to read column: {e}"))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("Bad UUID '{s}': {e}")))
}

/// Map a libsql Row to an Order.
///
/// Column order: 0:id, 1:customer_name, 2:customer_email, 3:status, 4:created_at
fn row_to_order(row: &libsql::Row) -> Result<Order, DatabaseError> {
    let id_str: String = row.get(0).map_err(column_error)?;
    let created_str: String = row.get(4).map_err(column_error)?;

    Ok(Order {
        id: parse_uuid(&id_str)?,
        customer_name: row.get(1).map_err(column_error)?,
        customer_email: row.get(2).map_err(column_error)?,
        status: row.get(3).map_err(column_error)?,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to an OrderCommunication.
///
/// Column order matches COMM_COLUMNS.
fn row_to_communication(row: &libsql::Row) -> Result<OrderCommunication, DatabaseError> {
    let id_str: String = row.get(0).map_err(column_error)?;
    let order_id_str: String = row.get(1).map_err(column_error)?;
    let direction_str: String = row.get(2).map_err(column_error)?;
    let attachments_json: Option<String> = row.get(9).ok();
    let read_flag: i64 = row.get(11).map_err(column_error)?;
    let created_str: String = row.get(12).map_err(column_error)?;

    let attachments: Vec<AttachmentRef> = match attachments_json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| DatabaseError::Serialization(format!("Bad attachments JSON: {e}")))?,
        None => Vec::new(),
    };

    Ok(OrderCommunication {
        id: parse_uuid(&id_str)?,
        order_id: parse_uuid(&order_id_str)?,
        direction: str_to_direction(&direction_str),
        admin_id: row.get(3).ok(),
        sender_email: row.get(4).map_err(column_error)?,
        recipient_email: row.get(5).map_err(column_error)?,
        subject: row.get(6).map_err(column_error)?,
        body: row.get(7).map_err(column_error)?,
        reply_to_token: row.get(8).map_err(column_error)?,
        attachments,
        message_id: row.get(10).ok(),
        read_by_admin: read_flag != 0,
        created_at: parse_datetime(&created_str),
    })
}

// ── Store impl ──────────────────────────────────────────────────────

#[async_trait]
impl Store for LibSqlStore {
    async fn insert_order(&self, order: &Order) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO orders (id, customer_name, customer_email, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    order.id.to_string(),
                    order.customer_name.clone(),
                    order.customer_email.clone(),
                    order.status.clone(),
                    order.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to insert order: {e}")))?;
        debug!(order_id = %order.id, "Order inserted");
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, customer_name, customer_email, status, created_at
                 FROM orders WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to query order: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read order row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_order(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM orders WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to delete order: {e}")))?;
        Ok(affected > 0)
    }

    async fn insert_communication(&self, comm: &OrderCommunication) -> Result<(), DatabaseError> {
        let attachments_json = if comm.attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&comm.attachments).map_err(|e| {
                DatabaseError::Serialization(format!("Failed to serialize attachments: {e}"))
            })?)
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO order_communications ({COMM_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    comm.id.to_string(),
                    comm.order_id.to_string(),
                    direction_to_str(comm.direction),
                    comm.admin_id.clone(),
                    comm.sender_email.clone(),
                    comm.recipient_email.clone(),
                    comm.subject.clone(),
                    comm.body.clone(),
                    comm.reply_to_token.clone(),
                    attachments_json,
                    comm.message_id.clone(),
                    if comm.read_by_admin { 1i64 } else { 0i64 },
                    comm.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to insert communication: {e}")))?;

        debug!(
            communication_id = %comm.id,
            order_id = %comm.order_id,
            direction = direction_to_str(comm.direction),
            "Communication inserted"
        );
        Ok(())
    }

    async fn get_communication_by_reply_token(
        &self,
        token: &str,
    ) -> Result<Option<OrderCommunication>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMM_COLUMNS} FROM order_communications
                     WHERE reply_to_token = ?1 AND direction = 'outbound'
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![token],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to query by reply token: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read communication row: {e}")))?
        {
            Some(row) => Ok(Some(row_to_communication(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_communications(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderCommunication>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {COMM_COLUMNS} FROM order_communications
                     WHERE order_id = ?1 ORDER BY created_at ASC"
                ),
                params![order_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to list communications: {e}")))?;

        let mut comms = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read communication row: {e}")))?
        {
            comms.push(row_to_communication(&row)?);
        }
        Ok(comms)
    }

    async fn mark_communication_read(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE order_communications SET read_by_admin = 1 WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to mark read: {e}")))?;
        Ok(affected > 0)
    }

    async fn unread_inbound_count(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM order_communications
                 WHERE direction = 'inbound' AND read_by_admin = 0",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to count unread: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read unread count: {e}")))?
        {
            Some(row) => row.get(0).map_err(column_error),
            None => Ok(0),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::token::encode_reply_token;

    async fn test_store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    fn outbound_comm(order: &Order) -> OrderCommunication {
        OrderCommunication {
            id: Uuid::new_v4(),
            order_id: order.id,
            direction: Direction::Outbound,
            admin_id: Some("admin-1".into()),
            sender_email: "shop@example.com".into(),
            recipient_email: order.customer_email.clone(),
            subject: "Your order proof".into(),
            body: "Please review the attached proof.".into(),
            reply_to_token: encode_reply_token(order.id),
            attachments: Vec::new(),
            message_id: Some("<abc123@orders.example.com>".into()),
            read_by_admin: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_order() {
        let store = test_store().await;
        let order = Order::new("Dana Coach", "dana@example.com");
        store.insert_order(&order).await.unwrap();

        let loaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.customer_name, "Dana Coach");
        assert_eq!(loaded.customer_email, "dana@example.com");
        assert_eq!(loaded.status, "new");
    }

    #[tokio::test]
    async fn get_order_not_found() {
        let store = test_store().await;
        assert!(store.get_order(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn communication_roundtrip_with_attachments() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        store.insert_order(&order).await.unwrap();

        let mut comm = outbound_comm(&order);
        comm.direction = Direction::Inbound;
        comm.admin_id = None;
        comm.read_by_admin = false;
        comm.attachments = vec![AttachmentRef {
            filename: "ab12cd34ef56-proof.pdf".into(),
            storage_path: "/data/attachments/ab12cd34ef56-proof.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 1024,
        }];
        store.insert_communication(&comm).await.unwrap();

        let thread = store.list_communications(order.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        let loaded = &thread[0];
        assert_eq!(loaded.direction, Direction::Inbound);
        assert!(loaded.admin_id.is_none());
        assert!(!loaded.read_by_admin);
        assert_eq!(loaded.attachments, comm.attachments);
    }

    #[tokio::test]
    async fn reply_token_lookup_finds_latest_outbound() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        store.insert_order(&order).await.unwrap();

        let mut first = outbound_comm(&order);
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        store.insert_communication(&first).await.unwrap();

        let second = outbound_comm(&order);
        store.insert_communication(&second).await.unwrap();

        // An inbound row with the same token must not shadow the outbound one.
        let mut inbound = outbound_comm(&order);
        inbound.direction = Direction::Inbound;
        inbound.admin_id = None;
        store.insert_communication(&inbound).await.unwrap();

        let token = encode_reply_token(order.id);
        let found = store
            .get_communication_by_reply_token(&token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);
        assert_eq!(found.direction, Direction::Outbound);
    }

    #[tokio::test]
    async fn reply_token_lookup_not_found() {
        let store = test_store().await;
        assert!(store
            .get_communication_by_reply_token("ord-ffffffff")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_communications_oldest_first() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        store.insert_order(&order).await.unwrap();

        let mut older = outbound_comm(&order);
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        store.insert_communication(&older).await.unwrap();

        let newer = outbound_comm(&order);
        store.insert_communication(&newer).await.unwrap();

        let thread = store.list_communications(order.id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].id, older.id);
        assert_eq!(thread[1].id, newer.id);
    }

    #[tokio::test]
    async fn mark_read_flips_flag() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        store.insert_order(&order).await.unwrap();

        let mut comm = outbound_comm(&order);
        comm.direction = Direction::Inbound;
        comm.admin_id = None;
        comm.read_by_admin = false;
        store.insert_communication(&comm).await.unwrap();

        assert_eq!(store.unread_inbound_count().await.unwrap(), 1);
        assert!(store.mark_communication_read(comm.id).await.unwrap());
        assert_eq!(store.unread_inbound_count().await.unwrap(), 0);

        let thread = store.list_communications(order.id).await.unwrap();
        assert!(thread[0].read_by_admin);
    }

    #[tokio::test]
    async fn mark_read_unknown_id_returns_false() {
        let store = test_store().await;
        assert!(!store.mark_communication_read(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_order_cascades_to_communications() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        store.insert_order(&order).await.unwrap();
        store
            .insert_communication(&outbound_comm(&order))
            .await
            .unwrap();

        assert!(store.delete_order(order.id).await.unwrap());
        assert!(store.list_communications(order.id).await.unwrap().is_empty());

        let token = encode_reply_token(order.id);
        assert!(store
            .get_communication_by_reply_token(&token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn communication_requires_existing_order() {
        let store = test_store().await;
        let order = Order::new("Dana", "dana@example.com");
        // Order deliberately NOT inserted.
        let result = store.insert_communication(&outbound_comm(&order)).await;
        assert!(result.is_err());
    }
}
