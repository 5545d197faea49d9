use thiserror::Error;

use crate::credentials::StagingError;
use crate::git::{MirrorError, TemplateError};

/// Everything that can stop a sync invocation.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("worker is not configured: {0:#}")]
    Configuration(anyhow::Error),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    InvalidTemplate(#[from] TemplateError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

impl WorkerError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingField(_) | Self::InvalidField { .. } => 400,
            Self::Mirror(err) if err.is_exit_failure() => 502,
            Self::Configuration(_)
            | Self::Staging(_)
            | Self::InvalidTemplate(_)
            | Self::Mirror(_) => 500,
        }
    }

    /// Input problems, as opposed to failures while doing the work.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::InvalidField { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(WorkerError::MissingField("repository.name").status_code(), 400);
        assert_eq!(
            WorkerError::Mirror(MirrorError::CloneFailed {
                status: "exit status: 128".into(),
                stderr: "not found".into(),
            })
            .status_code(),
            502
        );
        assert_eq!(
            WorkerError::InvalidTemplate(TemplateError::Placeholder {
                template: "x".into(),
                found: 0
            })
            .status_code(),
            500
        );
        assert_eq!(
            WorkerError::Staging(StagingError::Fetch {
                name: "deploy-id_rsa".into(),
                error: anyhow::anyhow!("ParameterNotFound"),
            })
            .status_code(),
            500
        );
    }
}
