//! Inbound request authentication.
//!
//! Webhook deliveries may be signed with a shared HMAC secret; see
//! [`webhook`].

pub mod webhook;
