// POST /api/info

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::UrlRequest;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::downloader::models::VideoMetadata;
use crate::downloader::reference::validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub title: String,
    pub author: String,
    /// Whole seconds
    pub duration: u64,
    pub thumbnail: String,
    pub view_count: u64,
}

impl From<VideoMetadata> for InfoResponse {
    fn from(metadata: VideoMetadata) -> Self {
        Self {
            title: metadata.title,
            author: metadata.author,
            duration: metadata.duration_secs,
            thumbnail: metadata.thumbnail,
            view_count: metadata.view_count,
        }
    }
}

pub async fn info(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<InfoResponse>, ApiError> {
    let Json(request) = payload?;
    let reference = validate(&request.url)?;
    tracing::debug!(raw = reference.raw(), url = %reference, "info requested");

    let resolution = state.metadata_chain.resolve_metadata(&reference).await;
    tracing::debug!(url = %reference, attempts = ?resolution.attempted(), "metadata resolved");

    let metadata = resolution.into_result().map_err(|err| {
        tracing::warn!(url = %reference, category = %err.category, error = %err, "metadata lookup failed");
        ApiError::from(err)
    })?;

    Ok(Json(metadata.into()))
}
