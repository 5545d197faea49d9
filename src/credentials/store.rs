use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::{ParameterStoreConfig, WorkerConfig};

/// Named secret lookup.  Implementations always return the decrypted value.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// AWS Systems Manager
// ---------------------------------------------------------------------------

pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    #[instrument(skip(self))]
    async fn get_parameter(&self, name: &str) -> Result<String> {
        let resp = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .with_context(|| format!("SSM GetParameter {name}"))?;

        let value = resp
            .parameter()
            .and_then(|p| p.value())
            .with_context(|| format!("SSM parameter {name} has no value"))?;

        debug!(len = value.len(), "parameter fetched");
        Ok(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// Reads `<root>/<name>` for each parameter.  Intended for local runs where
/// no parameter service is reachable.
pub struct DirectoryParameterStore {
    root: PathBuf,
}

impl DirectoryParameterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ParameterStore for DirectoryParameterStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn get_parameter(&self, name: &str) -> Result<String> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            bail!("invalid parameter name: {name:?}");
        }

        let path = self.root.join(name);
        let mut value = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read parameter file {}", path.display()))?;

        // Files edited by hand usually end in a newline; staging adds its own.
        if value.ends_with('\n') {
            value.pop();
            if value.ends_with('\r') {
                value.pop();
            }
        }

        debug!(len = value.len(), "parameter read from directory");
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the configured [`ParameterStore`].
pub fn build_parameter_store(
    config: &WorkerConfig,
    aws_config: &aws_config::SdkConfig,
) -> Arc<dyn ParameterStore> {
    match &config.parameter_store {
        ParameterStoreConfig::Ssm => {
            Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(aws_config)))
        }
        ParameterStoreConfig::Directory { path } => {
            Arc::new(DirectoryParameterStore::new(path.clone()))
        }
    }
}
