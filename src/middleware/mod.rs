//! Per-request tracking for http servers.
//!
//! Each inbound request gets its own [`crate::context::ContextCell`], keyed
//! by the request fingerprint, and the handler runs inside it together with a
//! `request` span.

#[cfg(feature = "actix")]
pub mod actix;
#[cfg(feature = "tower")]
pub mod tower;
