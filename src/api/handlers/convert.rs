// POST /api/convert
//
// validate -> transcoder check -> metadata -> audio -> transcode -> stream.
// Every step before the first transcoded byte may still fail with a status
// code; after that the streamer owns the response.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::UrlRequest;
use crate::api::state::AppState;
use crate::api::streamer::{download_headers, ResponseStreamer};
use crate::downloader::errors::ClassifiedError;
use crate::downloader::reference::validate;

pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Response {
    let streamer = ResponseStreamer::new();
    match start(&state, &streamer, payload).await {
        Ok(response) => response,
        Err(err) => streamer.fail(err).into_response(),
    }
}

async fn start(
    state: &AppState,
    streamer: &ResponseStreamer,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Response, ClassifiedError> {
    let Json(request) = payload.map_err(|e| ClassifiedError::invalid_input(e.body_text()))?;
    let reference = validate(&request.url)?;
    tracing::debug!(raw = reference.raw(), url = %reference, "conversion requested");

    if !state.transcoder.is_available().await {
        return Err(ClassifiedError::provider_unavailable(format!(
            "{} is not installed",
            state.transcoder.name()
        )));
    }

    let metadata = state
        .metadata_chain
        .resolve_metadata(&reference)
        .await
        .into_result()?;

    let audio = state.audio_chain.resolve_audio(&reference).await;
    tracing::debug!(url = %reference, attempts = ?audio.attempted(), "audio resolved");
    let source = audio.into_result()?;

    tracing::info!(
        title = %metadata.title,
        provider = source.provider(),
        handoff = ?source.handoff(),
        "converting to {}",
        state.options.format.name
    );

    let output = state.transcoder.transcode(source, &state.options).await?;
    let headers = download_headers(&metadata.title, output.format);
    streamer.stream(headers, output.body).await
}
