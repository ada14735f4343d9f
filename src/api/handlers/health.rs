// GET /api/health - capability checks

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;
use crate::downloader::models::Operation;
use crate::downloader::tools::ToolInfo;
use crate::downloader::traits::ProviderKind;

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub name: &'static str,
    pub kind: ProviderKind,
    pub available: bool,
    pub metadata: bool,
    pub audio: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when a conversion can succeed end to end, `degraded` otherwise
    pub status: &'static str,
    pub transcoder: ToolInfo,
    pub providers: Vec<ProviderStatus>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let transcoder = state.transcoder.info().await;

    let mut providers = Vec::new();
    for p in state.providers() {
        providers.push(ProviderStatus {
            name: p.name(),
            kind: p.kind(),
            available: p.is_available().await,
            metadata: p.supports(Operation::Metadata),
            audio: p.supports(Operation::Audio),
        });
    }

    let can_convert = transcoder.available
        && providers.iter().any(|p| p.available && p.metadata)
        && providers.iter().any(|p| p.available && p.audio);

    Json(HealthResponse {
        status: if can_convert { "ok" } else { "degraded" },
        transcoder,
        providers,
    })
}
