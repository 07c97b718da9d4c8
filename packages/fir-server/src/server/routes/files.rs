//! One-off artifact fetch and download-tree browsing.

use anyhow::anyhow;
use axum::extract::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::ApiError;
use crate::kernel::artifact::{ArtifactDest, FetchOutcome};
use crate::kernel::files::{download_tree, FileNode};
use crate::server::app::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFirRequest {
    pub fir_no: String,
    pub print_token: String,
    #[serde(default)]
    pub request_name: Option<String>,
    #[serde(default)]
    pub district_name: Option<String>,
    #[serde(default)]
    pub ps_name: Option<String>,
}

/// POST /api/download-fir — fetch a single record's PDF outside any job.
pub async fn download_fir(
    Extension(state): Extension<AppState>,
    Json(body): Json<DownloadFirRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.fir_no.trim().is_empty() || body.print_token.trim().is_empty() {
        return Err(ApiError::Validation("firNo and printToken required".to_string()));
    }
    let sessions = &state.deps.sessions;
    if !sessions.is_ready() {
        return Err(ApiError::SessionUnavailable);
    }

    let lease = sessions.lease().await?;
    let dest = ArtifactDest {
        job_name: body.request_name.as_deref().unwrap_or("Default"),
        district_id: body.district_name.as_deref().unwrap_or("UnknownDistrict"),
        station_label: body.ps_name.as_deref().unwrap_or("UnknownStation"),
        fir_no: &body.fir_no,
    };

    match state
        .deps
        .fetcher
        .fetch(lease.session(), &body.print_token, &dest, None)
        .await
    {
        FetchOutcome::Downloaded(path) => Ok(Json(json!({
            "success": true,
            "path": path.to_string_lossy(),
        }))),
        FetchOutcome::Failed(reason) => Err(ApiError::Internal(anyhow!(reason))),
        // No stop gate was supplied, but keep the arm exhaustive.
        FetchOutcome::Stopped => Err(ApiError::Internal(anyhow!("fetch interrupted"))),
    }
}

/// GET /api/files — tree of everything under the download root.
pub async fn list_files(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<FileNode>>, ApiError> {
    let tree = download_tree(state.deps.fetcher.root()).await?;
    Ok(Json(tree))
}
