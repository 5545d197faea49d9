//! Webhook relay: normalize an inbound event and hand it to the sync worker.
//!
//! The relay's job ends once the dispatch transport acknowledges the
//! hand-off; it never waits for, or looks at, the worker's result.

pub mod dispatch;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::metrics::{MetricsRegistry, RelayOutcome};
use crate::response::ApiResponse;
use crate::worker::event::json_type;

pub use dispatch::{build_dispatcher, Dispatcher, INVOCATION_TYPE_HEADER};

#[derive(Debug, Error)]
pub enum RelayError {
    /// The body is neither a JSON object nor a string.
    #[error("bad input, expected dict -> {0}")]
    BadInput(String),

    /// The body is a string that could not be parsed.
    #[error("unknown error -> {0}")]
    Internal(String),

    #[error("dispatch failed -> {0:#}")]
    Dispatch(anyhow::Error),
}

impl RelayError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadInput(_) => 400,
            Self::Internal(_) | Self::Dispatch(_) => 500,
        }
    }

    fn outcome(&self) -> RelayOutcome {
        match self {
            Self::BadInput(_) => RelayOutcome::BadInput,
            Self::Internal(_) => RelayOutcome::InternalError,
            Self::Dispatch(_) => RelayOutcome::DispatchFailed,
        }
    }
}

/// Bring `event.body` to a single structured form.
///
/// An object is used as-is; a string is parsed as JSON and whatever it
/// decodes to is forwarded.  Anything else, including a missing body, is a
/// wrong-type input.
pub fn normalize_body(event: &Value) -> Result<Value, RelayError> {
    match event.get("body") {
        Some(body @ Value::Object(_)) => Ok(body.clone()),
        Some(Value::String(raw)) => {
            serde_json::from_str::<Value>(raw).map_err(|e| RelayError::Internal(e.to_string()))
        }
        Some(other) => Err(RelayError::BadInput(format!("body is {}", json_type(other)))),
        None => Err(RelayError::BadInput("body is missing".to_string())),
    }
}

pub struct Relay {
    dispatcher: Arc<dyn Dispatcher>,
    metrics: MetricsRegistry,
}

impl Relay {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, metrics: MetricsRegistry) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Normalize and dispatch.  201 with an empty body once the transport
    /// has accepted the payload.
    #[instrument(skip_all, fields(dispatcher = self.dispatcher.kind()))]
    pub async fn handle(&self, event: &Value) -> ApiResponse {
        info!(%event, "received webhook event");

        match self.relay(event).await {
            Ok(()) => {
                self.metrics.metrics.record_relay(RelayOutcome::Dispatched);
                ApiResponse::empty(201)
            }
            Err(err) => {
                self.metrics.metrics.record_relay(err.outcome());
                match &err {
                    RelayError::BadInput(_) => warn!(error = %err, "rejected webhook event"),
                    RelayError::Internal(_) | RelayError::Dispatch(_) => {
                        error!(error = %err, "failed to relay webhook event")
                    }
                }
                ApiResponse::message(err.status_code(), err.to_string())
            }
        }
    }

    async fn relay(&self, event: &Value) -> Result<(), RelayError> {
        let body = normalize_body(event)?;
        self.dispatcher
            .dispatch(&body)
            .await
            .map_err(RelayError::Dispatch)?;
        info!("event dispatched to sync worker");
        Ok(())
    }

    pub fn record_unauthorized(&self) {
        self.metrics.metrics.record_relay(RelayOutcome::Unauthorized);
    }
}
