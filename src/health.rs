use std::path::{Path, PathBuf};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::git::GitRunner;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub git: CheckResult,
    pub staging: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy(detail: Option<String>) -> Self {
        Self { ok: true, detail }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// The subset of application state the health check needs.
#[derive(Clone)]
pub struct HealthState {
    pub git: GitRunner,
    pub staging_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

async fn check_git(git: &GitRunner) -> CheckResult {
    match git.version().await {
        Ok(version) => CheckResult::healthy(Some(version)),
        Err(e) => CheckResult::unhealthy(format!("{e:#}")),
    }
}

/// The staging root must exist and accept a new directory, since every sync
/// stages its credentials there.
async fn check_staging(root: &Path) -> CheckResult {
    let root = root.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix("mirror-health-")
            .tempdir_in(&root)
            .and_then(|dir| dir.close())
            .map(|()| root)
    })
    .await;

    match result {
        Ok(Ok(root)) => CheckResult::healthy(Some(root.display().to_string())),
        Ok(Err(e)) => CheckResult::unhealthy(format!("staging root not writable: {e}")),
        Err(e) => CheckResult::unhealthy(format!("staging check task failed: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if checks.git.ok && checks.staging.ok {
        HealthStatus::Ok
    } else if !checks.git.ok {
        // Nothing can be mirrored without git.
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

pub async fn health_report(state: &HealthState) -> HealthResponse {
    let (git, staging) = tokio::join!(check_git(&state.git), check_staging(&state.staging_root));
    let checks = HealthChecks { git, staging };
    HealthResponse {
        status: aggregate_status(&checks),
        checks,
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let body = health_report(&state).await;

    let http_status = match body.status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}
