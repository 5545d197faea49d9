//! HTTP surface of the relay service.
//!
//! An axum server that accepts webhook deliveries, exposes direct
//! invocation routes for the relay and the sync worker, and serves health
//! and metrics endpoints.

pub mod handler;
