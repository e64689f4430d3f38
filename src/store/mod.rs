//! Persistence layer — libSQL-backed storage for orders and communications.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{AttachmentRef, Direction, Order, OrderCommunication, Store};
