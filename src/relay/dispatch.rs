//! Fire-and-forget hand-off from the relay to the sync worker.
//!
//! Every [`Dispatcher`] returns as soon as its transport has accepted the
//! payload.  None of them observe the sync outcome.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{DispatchMode, RelayConfig};
use crate::worker::SyncWorker;

/// Request header asking `/invoke/sync` to run in the background.
pub const INVOCATION_TYPE_HEADER: &str = "X-Invocation-Type";

/// Header value for background (event) invocations.
pub const EVENT_INVOCATION: &str = "Event";

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Hand `payload` to the worker without waiting for the sync to run.
    async fn dispatch(&self, payload: &Value) -> Result<()>;

    /// Short transport name for logs.
    fn kind(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// AWS Lambda
// ---------------------------------------------------------------------------

pub struct LambdaDispatcher {
    client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaDispatcher {
    pub fn new(client: aws_sdk_lambda::Client, function_name: String) -> Self {
        Self {
            client,
            function_name,
        }
    }
}

#[async_trait]
impl Dispatcher for LambdaDispatcher {
    #[instrument(skip(self, payload), fields(function = %self.function_name))]
    async fn dispatch(&self, payload: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload).context("serialize dispatch payload")?;

        let resp = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(bytes))
            .send()
            .await
            .with_context(|| format!("Lambda Invoke {}", self.function_name))?;

        let status = resp.status_code();
        if !(200..300).contains(&status) {
            bail!(
                "Lambda Invoke {} returned status {status}",
                self.function_name
            );
        }

        debug!(status, "event invocation accepted");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "lambda"
    }
}

// ---------------------------------------------------------------------------
// HTTP peer
// ---------------------------------------------------------------------------

/// Posts to another instance's `/invoke/sync` as an event invocation; the
/// peer answers 202 before it starts the sync.
pub struct HttpDispatcher {
    http_client: reqwest::Client,
    sync_url: String,
}

impl HttpDispatcher {
    pub fn new(http_client: reqwest::Client, worker_url: &str) -> Self {
        Self {
            http_client,
            sync_url: format!("{}/invoke/sync", worker_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    #[instrument(skip(self, payload), fields(url = %self.sync_url))]
    async fn dispatch(&self, payload: &Value) -> Result<()> {
        let resp = self
            .http_client
            .post(&self.sync_url)
            .header(INVOCATION_TYPE_HEADER, EVENT_INVOCATION)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {}", self.sync_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unreadable>"));
            bail!("POST {} returned {status}: {}", self.sync_url, body.trim());
        }

        debug!(%status, "event invocation accepted");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Spawns the sync onto the current Tokio runtime as a tracked background task.
pub struct LocalDispatcher {
    worker: Arc<SyncWorker>,
}

impl LocalDispatcher {
    pub fn new(worker: Arc<SyncWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, payload: &Value) -> Result<()> {
        self.worker.spawn(payload.clone());
        debug!("sync spawned in-process");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the [`Dispatcher`] selected by `relay.dispatch.mode`.
pub fn build_dispatcher(
    config: &RelayConfig,
    aws_config: &aws_config::SdkConfig,
    http_client: &reqwest::Client,
    worker: Arc<SyncWorker>,
) -> Result<Arc<dyn Dispatcher>> {
    let dispatcher: Arc<dyn Dispatcher> = match config.dispatch.mode {
        DispatchMode::Lambda => {
            let function_name = config.dispatch.resolve_function_name()?;
            Arc::new(LambdaDispatcher::new(
                aws_sdk_lambda::Client::new(aws_config),
                function_name,
            ))
        }
        DispatchMode::Http => {
            let worker_url = config
                .dispatch
                .worker_url
                .as_deref()
                .context("relay.dispatch.worker_url is required for http dispatch")?;
            Arc::new(HttpDispatcher::new(http_client.clone(), worker_url))
        }
        DispatchMode::Local => Arc::new(LocalDispatcher::new(worker)),
    };
    Ok(dispatcher)
}
