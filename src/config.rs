use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub worker: WorkerConfig,
    pub aws: AwsConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Name of the environment variable holding the webhook HMAC secret.
    ///
    /// When unset (or when the named variable is not present in the
    /// environment) incoming webhooks are accepted without a signature check.
    #[serde(default)]
    pub webhook_secret_env: Option<String>,
}

/// How the relay hands a normalized event to the sync worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// AWS Lambda `Invoke` with `InvocationType=Event`.
    #[default]
    Lambda,
    /// `POST /invoke/sync` on a peer instance of this service.
    Http,
    /// Spawn the worker on this process's runtime.
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,
    /// Literal target function name.  Takes precedence over
    /// `function_name_env`.
    #[serde(default)]
    pub function_name: Option<String>,
    /// Name of the environment variable that holds the target function name.
    #[serde(default = "default_function_name_env")]
    pub function_name_env: String,
    /// Base URL of the worker instance for `http` dispatch.
    #[serde(default)]
    pub worker_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            function_name: None,
            function_name_env: default_function_name_env(),
            worker_url: None,
        }
    }
}

fn default_function_name_env() -> String {
    "ASYNC_FUNCTION_NAME".to_string()
}

impl DispatchConfig {
    /// Resolve the Lambda function to invoke, from config or environment.
    pub fn resolve_function_name(&self) -> Result<String> {
        if let Some(name) = self.function_name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(name.clone());
        }
        std::env::var(&self.function_name_env).with_context(|| {
            format!(
                "dispatch target not configured: set relay.dispatch.function_name or ${}",
                self.function_name_env
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Literal deployment name used as the parameter-name prefix.
    #[serde(default)]
    pub deployment_name: Option<String>,
    /// Name of the environment variable holding the deployment name.
    #[serde(default = "default_deployment_name_env")]
    pub deployment_name_env: String,
    #[serde(default)]
    pub parameter_store: ParameterStoreConfig,
    /// Path or name of the `git` executable.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Parent directory for per-invocation staging directories.  Defaults to
    /// the system temporary directory.
    #[serde(default)]
    pub staging_root: Option<PathBuf>,
    /// Abort the mirror sequence and report failure when a git step exits
    /// non-zero.  When `false`, failures are logged and the sequence carries
    /// on to a success response.
    #[serde(default = "bool_true")]
    pub fail_on_git_error: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            deployment_name: None,
            deployment_name_env: default_deployment_name_env(),
            parameter_store: ParameterStoreConfig::default(),
            git_binary: default_git_binary(),
            staging_root: None,
            fail_on_git_error: true,
        }
    }
}

fn default_deployment_name_env() -> String {
    "AWS_LAMBDA_FUNCTION_NAME".to_string()
}

fn default_git_binary() -> String {
    "git".to_string()
}

fn bool_true() -> bool {
    true
}

impl WorkerConfig {
    /// Resolve the deployment name that prefixes every parameter name.
    pub fn resolve_deployment_name(&self) -> Result<String> {
        if let Some(name) = self.deployment_name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(name.clone());
        }
        std::env::var(&self.deployment_name_env).with_context(|| {
            format!(
                "deployment name not configured: set worker.deployment_name or ${}",
                self.deployment_name_env
            )
        })
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParameterStoreConfig {
    /// AWS Systems Manager Parameter Store.
    #[default]
    Ssm,
    /// One file per parameter under `path`, named after the parameter.
    Directory { path: PathBuf },
}

// ---------------------------------------------------------------------------
// AWS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    /// Region override; the SDK's default provider chain applies otherwise.
    #[serde(default)]
    pub region: Option<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`, or use the
/// defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            parse_config(&contents)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        }
        None => Config::default(),
    };
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(contents: &str) -> Result<Config> {
    // An empty document deserializes to `null`; treat it as all-defaults.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Cross-field checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    config
        .server
        .listen
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("invalid server.listen address: {}", config.server.listen))?;

    if config.relay.dispatch.mode == DispatchMode::Http {
        let url = config.relay.dispatch.worker_url.as_deref().unwrap_or("");
        anyhow::ensure!(
            url.starts_with("http://") || url.starts_with("https://"),
            "relay.dispatch.worker_url must be an http(s) URL when mode is http"
        );
    }

    if let ParameterStoreConfig::Directory { path } = &config.worker.parameter_store {
        anyhow::ensure!(
            !path.as_os_str().is_empty(),
            "worker.parameter_store.path must not be empty"
        );
    }

    anyhow::ensure!(
        !config.worker.git_binary.trim().is_empty(),
        "worker.git_binary must not be empty"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.relay.dispatch.mode, DispatchMode::Lambda);
        assert_eq!(config.relay.dispatch.function_name_env, "ASYNC_FUNCTION_NAME");
        assert_eq!(config.worker.deployment_name_env, "AWS_LAMBDA_FUNCTION_NAME");
        assert_eq!(config.worker.parameter_store, ParameterStoreConfig::Ssm);
        assert!(config.worker.fail_on_git_error);
        assert!(config.relay.webhook_secret_env.is_none());
    }

    #[test]
    fn full_document_parses() {
        let yaml = r#"
server:
  listen: "127.0.0.1:9000"
relay:
  webhook_secret_env: HOOK_SECRET
  dispatch:
    mode: http
    worker_url: "http://worker.internal:8080"
worker:
  deployment_name: prod-sync
  git_binary: /usr/bin/git
  fail_on_git_error: false
  parameter_store:
    kind: directory
    path: /run/secrets
aws:
  region: eu-west-1
"#;
        let config = parse_config(yaml).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.relay.dispatch.mode, DispatchMode::Http);
        assert_eq!(config.relay.webhook_secret_env.as_deref(), Some("HOOK_SECRET"));
        assert_eq!(config.worker.resolve_deployment_name().unwrap(), "prod-sync");
        assert!(!config.worker.fail_on_git_error);
        assert_eq!(
            config.worker.parameter_store,
            ParameterStoreConfig::Directory {
                path: PathBuf::from("/run/secrets")
            }
        );
        assert_eq!(config.aws.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn http_dispatch_requires_worker_url() {
        let config = parse_config("relay:\n  dispatch:\n    mode: http\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let config = parse_config("server:\n  listen: not-an-address\n").unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn literal_function_name_wins_over_env() {
        let dispatch = DispatchConfig {
            function_name: Some("sync-fn".to_string()),
            function_name_env: "MIRROR_RELAY_TEST_UNSET_VAR".to_string(),
            ..DispatchConfig::default()
        };
        assert_eq!(dispatch.resolve_function_name().unwrap(), "sync-fn");
    }

    #[test]
    fn missing_function_name_is_an_error() {
        let dispatch = DispatchConfig {
            function_name_env: "MIRROR_RELAY_TEST_UNSET_VAR".to_string(),
            ..DispatchConfig::default()
        };
        assert!(dispatch.resolve_function_name().is_err());
    }
}
