// Route table and middleware

use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, MakeSpan, TraceLayer};
use tracing::Span;

use super::handlers::{convert, health, info};
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/info", post(info::info))
        .route("/api/convert", post(convert::convert))
        .route("/api/health", get(health::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            // Health checks are polled; keep them out of the request log
            if req.uri().path() == "/api/health" {
                Span::none()
            } else {
                DefaultMakeSpan::new().level(tracing::Level::INFO).make_span(req)
            }
        }))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::downloader::errors::{ClassifiedError, ErrorCategory};
    use crate::downloader::orchestrator::ProviderChain;
    use crate::downloader::testing::StubProvider;
    use crate::downloader::traits::{ExtractionProvider, ProviderKind};
    use crate::downloader::transcoder::{ProcessTranscoder, TranscodeOptions, Transcoder};

    const URL: &str = "https://youtu.be/abc12345678";

    fn state_with(providers: &[Arc<StubProvider>], transcoder: Arc<dyn Transcoder>) -> AppState {
        let chain = || {
            providers.iter().fold(ProviderChain::new(Duration::from_secs(5)), |chain, p| {
                let provider: Arc<dyn ExtractionProvider> = p.clone();
                chain.with_provider(provider)
            })
        };
        AppState::new(chain(), chain(), transcoder, TranscodeOptions::default())
    }

    fn passthrough() -> Arc<dyn Transcoder> {
        Arc::new(ProcessTranscoder::custom("cat", vec![]))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_info_returns_metadata() {
        let stub = StubProvider::new("stub").shared();
        let app = create_router(state_with(&[stub.clone()], passthrough()));

        let response = app
            .oneshot(post_json("/api/info", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({
                "title": "Song",
                "author": "Artist",
                "duration": 125,
                "thumbnail": "https://x/y.jpg",
                "viewCount": 1000
            })
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_never_reaches_providers() {
        let stub = StubProvider::new("stub").shared();
        let app = create_router(state_with(&[stub.clone()], passthrough()));

        for uri in ["/api/info", "/api/convert"] {
            let response = app
                .clone()
                .oneshot(post_json(uri, serde_json::json!({ "url": "not a url" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(
                json_body(response).await,
                serde_json::json!({ "error": "URL YouTube invalide" })
            );
        }
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = create_router(state_with(&[StubProvider::new("stub").shared()], passthrough()));

        let response = app
            .oneshot(post_json("/api/info", serde_json::json!({ "link": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_convert_streams_transcoded_audio() {
        let payload = b"pretend this is opus".repeat(500);
        let stub = StubProvider::new("stub").with_payload(&payload).shared();
        let app = create_router(state_with(&[stub], passthrough()));

        let response = app
            .oneshot(post_json("/api/convert", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("filename=\"Song.mp3\""), "{disposition}");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_convert_without_transcoder_is_unavailable() {
        let stub = StubProvider::new("stub").shared();
        let missing = Arc::new(ProcessTranscoder::ffmpeg("definitely-not-installed-ffmpeg"));
        let app = create_router(state_with(&[stub.clone()], missing));

        let response = app
            .oneshot(post_json("/api/convert", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_chain_failure_maps_to_status() {
        let blocked = StubProvider::new("blocked")
            .failing(ClassifiedError::video_private("Private video"))
            .shared();
        let next = StubProvider::new("next").shared();
        let app = create_router(state_with(&[blocked, next.clone()], passthrough()));

        let response = app
            .oneshot(post_json("/api/info", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        // A private video is authoritative; nobody else is asked
        assert_eq!(next.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_after_bot_check() {
        let primary = StubProvider::new("primary")
            .failing(ClassifiedError::new(ErrorCategory::AutomatedTrafficSuspected, "Sign in to confirm"))
            .shared();
        let fallback = StubProvider::new("fallback")
            .kind(ProviderKind::FallbackApi)
            .gated_on(ErrorCategory::AutomatedTrafficSuspected)
            .shared();
        let app = create_router(state_with(&[primary, fallback.clone()], passthrough()));

        let response = app
            .oneshot(post_json("/api/info", serde_json::json!({ "url": URL })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_degraded_without_transcoder() {
        let missing = Arc::new(ProcessTranscoder::ffmpeg("definitely-not-installed-ffmpeg"));
        let app = create_router(state_with(&[StubProvider::new("stub").shared()], missing));

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["transcoder"]["available"], false);
        assert_eq!(json["providers"][0]["name"], "stub");
        assert_eq!(json["providers"][0]["available"], true);
    }

    #[tokio::test]
    async fn test_health_ok_with_passthrough() {
        let app = create_router(state_with(&[StubProvider::new("stub").shared()], passthrough()));

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
