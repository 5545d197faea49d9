//! Git mirror commands and URL templating.
//!
//! All operations shell out to the `git` binary using `tokio::process::Command`
//! for non-blocking execution.  SSH credentials reach git through an isolated
//! config file written into the invocation's staging directory.

pub mod commands;
pub mod template;

pub use commands::{ssh_command, GitIsolation, GitRunner, MirrorCommand, MirrorError, MirrorStep};
pub use template::{MirrorTarget, TemplateError};
