//! Mirror credential retrieval and staging.
//!
//! Reads the per-deployment SSH key, known-hosts data and URL templates from a
//! parameter store and stages them into an isolated, per-invocation
//! directory that is removed when the invocation ends.

pub mod staging;
pub mod store;

pub use staging::{stage_credentials, StagedCredentials, StagingError};
pub use store::{build_parameter_store, DirectoryParameterStore, ParameterStore};

/// The four parameters every deployment stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    PrivateKey,
    KnownHosts,
    FetchUrlTemplate,
    PushUrlTemplate,
}

impl Parameter {
    /// Fetch and staging order.
    pub const ALL: [Parameter; 4] = [
        Parameter::PrivateKey,
        Parameter::KnownHosts,
        Parameter::FetchUrlTemplate,
        Parameter::PushUrlTemplate,
    ];

    /// Suffix of the store name, also used as the staged file name.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::PrivateKey => "id_rsa",
            Self::KnownHosts => "known_hosts",
            Self::FetchUrlTemplate => "git_fetch_url_template",
            Self::PushUrlTemplate => "git_push_url_template",
        }
    }

    /// Full parameter-store name: `{deployment}-{suffix}`.
    pub fn store_name(self, deployment: &str) -> String {
        format!("{deployment}-{}", self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_names_follow_deployment_prefix() {
        let names: Vec<String> = Parameter::ALL
            .iter()
            .map(|p| p.store_name("acme-codecommit-sync"))
            .collect();
        assert_eq!(
            names,
            vec![
                "acme-codecommit-sync-id_rsa",
                "acme-codecommit-sync-known_hosts",
                "acme-codecommit-sync-git_fetch_url_template",
                "acme-codecommit-sync-git_push_url_template",
            ]
        );
    }
}
