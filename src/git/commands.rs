//! Git command wrappers using [`tokio::process::Command`].
//!
//! A mirror run is four independent `git` invocations.  Each one is built as
//! a structured argument vector, never handed to a shell, so values such as
//! repository names cannot be interpreted as shell syntax.  Credential
//! isolation travels with the child process (`HOME`, `GIT_CONFIG_GLOBAL`,
//! ...); the service's own environment is never modified.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Remote name created by `git clone --mirror`.
pub const MIRROR_REMOTE: &str = "origin";

/// Variables that would let the caller's environment override the isolated
/// configuration.
const INHERITED_GIT_ENV: &[&str] = &[
    "GIT_SSH",
    "GIT_SSH_COMMAND",
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_CONFIG",
    "GIT_CONFIG_PARAMETERS",
    "GIT_CONFIG_COUNT",
];

// ---------------------------------------------------------------------------
// Steps and failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorStep {
    ConfigureTransport,
    Clone,
    SetPushUrl,
    Push,
}

impl MirrorStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigureTransport => "configure-transport",
            Self::Clone => "clone",
            Self::SetPushUrl => "set-push-url",
            Self::Push => "push",
        }
    }

    fn failed(self, status: String, stderr: String) -> MirrorError {
        match self {
            Self::ConfigureTransport => MirrorError::TransportConfigFailed { status, stderr },
            Self::Clone => MirrorError::CloneFailed { status, stderr },
            Self::SetPushUrl => MirrorError::RemoteRewriteFailed { status, stderr },
            Self::Push => MirrorError::PushFailed { status, stderr },
        }
    }
}

impl fmt::Display for MirrorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("git config core.sshCommand failed ({status}): {stderr}")]
    TransportConfigFailed { status: String, stderr: String },

    #[error("git clone --mirror failed ({status}): {stderr}")]
    CloneFailed { status: String, stderr: String },

    #[error("git remote set-url --push failed ({status}): {stderr}")]
    RemoteRewriteFailed { status: String, stderr: String },

    #[error("git push --mirror failed ({status}): {stderr}")]
    PushFailed { status: String, stderr: String },

    #[error("failed to spawn git for step {step}: {source}")]
    Spawn {
        step: MirrorStep,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub fn step(&self) -> MirrorStep {
        match self {
            Self::TransportConfigFailed { .. } => MirrorStep::ConfigureTransport,
            Self::CloneFailed { .. } => MirrorStep::Clone,
            Self::RemoteRewriteFailed { .. } => MirrorStep::SetPushUrl,
            Self::PushFailed { .. } => MirrorStep::Push,
            Self::Spawn { step, .. } => *step,
        }
    }

    /// `true` when git ran and exited non-zero, as opposed to not running at all.
    pub fn is_exit_failure(&self) -> bool {
        !matches!(self, Self::Spawn { .. })
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One step of the mirror sequence, as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCommand {
    /// `git config --file <config_file> core.sshCommand <ssh_command>`
    ConfigureTransport {
        config_file: PathBuf,
        ssh_command: String,
    },
    /// `git clone --mirror -- <url> <dest>`
    Clone { url: String, dest: PathBuf },
    /// `git --git-dir <git_dir> remote set-url --push origin <url>`
    SetPushUrl { git_dir: PathBuf, url: String },
    /// `git --git-dir <git_dir> push --mirror`
    Push { git_dir: PathBuf },
}

impl MirrorCommand {
    pub fn step(&self) -> MirrorStep {
        match self {
            Self::ConfigureTransport { .. } => MirrorStep::ConfigureTransport,
            Self::Clone { .. } => MirrorStep::Clone,
            Self::SetPushUrl { .. } => MirrorStep::SetPushUrl,
            Self::Push { .. } => MirrorStep::Push,
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        match self {
            Self::ConfigureTransport {
                config_file,
                ssh_command,
            } => vec![
                "config".into(),
                "--file".into(),
                config_file.into(),
                "core.sshCommand".into(),
                ssh_command.into(),
            ],
            Self::Clone { url, dest } => vec![
                "clone".into(),
                "--mirror".into(),
                "--".into(),
                url.into(),
                dest.into(),
            ],
            Self::SetPushUrl { git_dir, url } => vec![
                "--git-dir".into(),
                git_dir.into(),
                "remote".into(),
                "set-url".into(),
                "--push".into(),
                MIRROR_REMOTE.into(),
                url.into(),
            ],
            Self::Push { git_dir } => vec![
                "--git-dir".into(),
                git_dir.into(),
                "push".into(),
                "--mirror".into(),
            ],
        }
    }
}

/// Build the `core.sshCommand` value: staged known-hosts and key only, batch
/// mode, and no user or system ssh config.
pub fn ssh_command(known_hosts: &Path, private_key: &Path) -> String {
    format!(
        "ssh -o UserKnownHostsFile={} -o IdentitiesOnly=yes -o BatchMode=yes -i {} -F /dev/null",
        shell_quote(known_hosts),
        shell_quote(private_key),
    )
}

/// git hands `core.sshCommand` to `sh -c`, so staged paths are single-quoted.
fn shell_quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

/// Per-invocation git environment, applied to each child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIsolation {
    pub home: PathBuf,
    pub config_file: PathBuf,
}

impl GitIsolation {
    pub fn env(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("HOME", self.home.clone().into_os_string()),
            ("GIT_CONFIG_GLOBAL", self.config_file.clone().into_os_string()),
            ("GIT_CONFIG_NOSYSTEM", "1".into()),
            ("GIT_TERMINAL_PROMPT", "0".into()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GitRunner {
    binary: String,
}

impl GitRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one mirror step to completion, capturing its exit status and
    /// stderr.
    #[instrument(skip(self, command, isolation), fields(step = %command.step()))]
    pub async fn run(
        &self,
        command: &MirrorCommand,
        isolation: &GitIsolation,
    ) -> Result<(), MirrorError> {
        let step = command.step();

        let mut cmd = Command::new(&self.binary);
        cmd.args(command.args());
        for key in INHERITED_GIT_ENV {
            cmd.env_remove(key);
        }
        for (key, value) in isolation.env() {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // A dropped sync must not leave git writing into a removed staging dir.
        cmd.kill_on_drop(true);

        debug!("spawning git");

        let output = cmd
            .output()
            .await
            .map_err(|source| MirrorError::Spawn { step, source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(step.failed(output.status.to_string(), stderr));
        }

        debug!("git step succeeded");
        Ok(())
    }

    /// `git --version`, used by the health check.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to spawn {} --version", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} --version failed (status {}): {}",
                self.binary,
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
