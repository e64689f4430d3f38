//! Reply-token codec — correlates inbound replies with their originating order.
//!
//! Every outbound message carries a synthetic reply-to address of the form
//! `order-<slug>@<inbound-domain>`, where `<slug>` is the first 8 hex chars of
//! the order id. The stored token is the same slug prefixed `ord-`.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

/// Prefix carried by stored reply tokens.
pub const TOKEN_PREFIX: &str = "ord-";

static REPLY_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\border-([a-z0-9]+)@").expect("valid regex"));

/// Derive the reply token for an order.
pub fn encode_reply_token(order_id: Uuid) -> String {
    let hex = order_id.simple().to_string();
    format!("{TOKEN_PREFIX}{}", &hex[..8])
}

/// Build the synthetic reply-to address for an order.
pub fn reply_address(order_id: Uuid, inbound_domain: &str) -> String {
    let hex = order_id.simple().to_string();
    format!("order-{}@{inbound_domain}", &hex[..8])
}

/// Recover the reply token from an RFC-5322 "to" header value.
///
/// Matches `order-<slug>@` case-insensitively anywhere in the header (the
/// header may contain display names or multiple recipients). Returns `None`
/// when no reply address is present — a normal outcome, not an error.
pub fn decode_reply_token(to_header: &str) -> Option<String> {
    let caps = REPLY_ADDRESS_RE.captures(to_header)?;
    let slug = caps.get(1)?.as_str().to_lowercase();
    Some(format!("{TOKEN_PREFIX}{slug}"))
}
