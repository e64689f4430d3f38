//! Mail handling — reply tokens, inbound normalization, quote stripping, SMTP outbound.

pub mod normalize;
pub mod outbound;
pub mod strip;
pub mod token;
