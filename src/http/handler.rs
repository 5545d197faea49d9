//! Axum router and request handlers.
//!
//! Routes:
//! - `POST /webhook`       - Forge webhook delivery, relayed to the worker
//! - `POST /invoke/relay`  - Direct relay invocation with a full event document
//! - `POST /invoke/sync`   - Direct worker invocation (`X-Invocation-Type: Event` runs detached)
//! - `GET  /healthz`       - Health check
//! - `GET  /metrics`       - Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::metrics::RelayOutcome;
use crate::relay::dispatch::EVENT_INVOCATION;
use crate::relay::INVOCATION_TYPE_HEADER;
use crate::response::ApiResponse;
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/invoke/relay", post(handle_invoke_relay))
        .route("/invoke/sync", post(handle_invoke_sync))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /webhook`
///
/// The raw delivery body becomes `event.body` as a string, exactly as an
/// API gateway would pass it on.
#[instrument(skip_all)]
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if let Some(secret) = state.webhook_secret.as_deref() {
        if let Err(e) = crate::auth::webhook::verify_signature(secret, &headers, &body) {
            warn!(error = %e, "webhook signature verification failed");
            state.relay.record_unauthorized();
            return Err(AppError::Unauthorized("invalid signature".to_string()));
        }
    }

    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => {
            state.metrics.metrics.record_relay(RelayOutcome::BadInput);
            warn!(error = %e, "webhook body is not UTF-8");
            return Ok(ApiResponse::message(
                400,
                format!("bad input, expected dict -> body is not valid UTF-8: {e}"),
            )
            .into_response());
        }
    };

    let event = json!({ "body": body });
    Ok(state.relay.handle(&event).await.into_response())
}

/// `POST /invoke/relay`
async fn handle_invoke_relay(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(resp) => {
            state.metrics.metrics.record_relay(RelayOutcome::BadInput);
            return resp.into_response();
        }
    };
    state.relay.handle(&event).await.into_response()
}

/// `POST /invoke/sync`
///
/// Event invocations are acknowledged with 202 before the sync starts; the
/// outcome is only visible in logs and metrics.
async fn handle_invoke_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(resp) => return resp.into_response(),
    };

    let is_event = headers
        .get(INVOCATION_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_INVOCATION));

    if is_event {
        state.worker.spawn(event);
        info!("sync accepted for background execution");
        return ApiResponse::empty(202).into_response();
    }

    state.worker.handle(&event).await.into_response()
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        git: state.worker.git().clone(),
        staging_root: state.worker.staging_root(),
    };
    crate::health::health_handler(State(health_state)).await
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state
        .metrics
        .encode()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Decode a direct-invocation document, answering 400 in the response
/// envelope when it is not JSON.
fn parse_event(body: &[u8]) -> Result<Value, ApiResponse> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "invocation body is not valid JSON");
        ApiResponse::message(400, format!("bad input, invalid JSON document -> {e}"))
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error that maps to an HTTP status code.
#[derive(Debug)]
pub enum AppError {
    /// The delivery failed signature verification.
    Unauthorized(String),
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized(msg) => ApiResponse::message(401, msg).into_response(),
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                ApiResponse::message(500, format!("Internal server error: {err:#}"))
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
