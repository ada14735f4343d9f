// Invidious provider - read-only metadata from public API instances
//
// Last resort: only consulted after a bot check, never used for audio.
// Instances are interchangeable and tried in order; the first one that
// answers authoritatively wins.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::downloader::errors::{ClassifiedError, ErrorCategory, ProviderError};
use crate::downloader::models::{AudioSource, Operation, Thumbnail, VideoMetadata};
use crate::downloader::reference::VideoReference;
use crate::downloader::traits::{ExtractionProvider, ProviderKind};

pub const DEFAULT_INSTANCES: &[&str] = &[
    "https://inv.nadeko.net",
    "https://invidious.nerdvpn.de",
    "https://yewtu.be",
];

const FIELDS: &str = "title,author,lengthSeconds,viewCount,videoThumbnails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvidiousConfig {
    pub instances: Vec<String>,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for InvidiousConfig {
    fn default() -> Self {
        Self {
            instances: DEFAULT_INSTANCES.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            proxy: None,
        }
    }
}

pub struct InvidiousProvider {
    instances: Vec<Url>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    title: Option<String>,
    author: Option<String>,
    length_seconds: Option<u64>,
    view_count: Option<u64>,
    #[serde(default)]
    video_thumbnails: Vec<VideoThumbnail>,
}

#[derive(Debug, Deserialize)]
struct VideoThumbnail {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

impl InvidiousProvider {
    pub fn new(config: InvidiousConfig) -> Result<Self, ProviderError> {
        let instances = config
            .instances
            .iter()
            .map(|raw| {
                Url::parse(raw.trim_end_matches('/'))
                    .map_err(|e| ProviderError::Unsupported(format!("invalid instance url {}: {}", raw, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            instances,
            client: builder.build()?,
        })
    }

    async fn query(&self, base: &Url, id: &str) -> Result<VideoMetadata, ProviderError> {
        let mut endpoint = base.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| ProviderError::Unsupported(format!("instance url cannot be a base: {}", base)))?
            .pop_if_empty()
            .extend(["api", "v1", "videos", id]);
        endpoint.query_pairs_mut().append_pair("fields", FIELDS);

        let response = self.client.get(endpoint.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                endpoint: base.host_str().unwrap_or_default().to_string(),
                body: body.chars().take(256).collect(),
            });
        }

        let video: VideoResponse = response.json().await?;
        Ok(metadata_from(video, base))
    }
}

/// Failures that say nothing about the video itself, only the instance
fn instance_level(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http { status, .. } => *status == 403 || *status == 429 || *status >= 500,
        ProviderError::Transport { .. } | ProviderError::Timeout(_) => true,
        ProviderError::Parse(_) => true,
        _ => false,
    }
}

fn metadata_from(video: VideoResponse, base: &Url) -> VideoMetadata {
    let thumbnails: Vec<Thumbnail> = video
        .video_thumbnails
        .into_iter()
        .map(|t| Thumbnail {
            // Some instances answer with paths relative to themselves
            url: base.join(&t.url).map(|u| u.to_string()).unwrap_or(t.url),
            width: t.width,
            height: t.height,
        })
        .collect();

    VideoMetadata {
        title: video
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string()),
        author: video
            .author
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "Unknown Author".to_string()),
        duration_secs: video.length_seconds.unwrap_or(0),
        thumbnail: Thumbnail::best(&thumbnails).map(|t| t.url.clone()).unwrap_or_default(),
        view_count: video.view_count.unwrap_or(0),
    }
}

#[async_trait]
impl ExtractionProvider for InvidiousProvider {
    fn name(&self) -> &'static str {
        "invidious"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::FallbackApi
    }

    async fn is_available(&self) -> bool {
        !self.instances.is_empty()
    }

    fn supports(&self, operation: Operation) -> bool {
        operation == Operation::Metadata
    }

    fn gated_on(&self) -> Option<ErrorCategory> {
        Some(ErrorCategory::AutomatedTrafficSuspected)
    }

    async fn fetch_metadata(&self, reference: &VideoReference) -> Result<VideoMetadata, ProviderError> {
        let id = reference.video_id().ok_or_else(|| {
            ProviderError::Classified(ClassifiedError::new(
                ErrorCategory::ExtractionFailed,
                format!("no video id in {}", reference),
            ))
        })?;

        let mut last: Option<ProviderError> = None;
        for base in &self.instances {
            match self.query(base, id.as_str()).await {
                Ok(metadata) => {
                    tracing::info!(instance = %base, "invidious instance answered");
                    return Ok(metadata);
                }
                Err(err) if instance_level(&err) => {
                    tracing::warn!(instance = %base, error = %err, "invidious instance failed, trying next");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last.unwrap_or_else(|| ProviderError::Unsupported("no invidious instance configured".to_string())))
    }

    async fn fetch_audio(&self, _reference: &VideoReference) -> Result<AudioSource, ProviderError> {
        Err(ProviderError::Unsupported(
            "invidious is used for metadata only".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::downloader::reference::validate;

    const VIDEO: &str = r#"{
        "title": "Song",
        "author": "Artist",
        "lengthSeconds": 125,
        "viewCount": 1000,
        "videoThumbnails": [
            {"quality": "default", "url": "/vi/abc12345678/default.jpg", "width": 120, "height": 90},
            {"quality": "maxres", "url": "/vi/abc12345678/maxres.jpg", "width": 1280, "height": 720}
        ]
    }"#;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(instances: Vec<String>) -> InvidiousProvider {
        InvidiousProvider::new(InvidiousConfig {
            instances,
            timeout_secs: 5,
            proxy: None,
        })
        .unwrap()
    }

    fn reference() -> VideoReference {
        validate("https://youtu.be/abc12345678").unwrap()
    }

    #[test]
    fn test_relative_thumbnails_are_joined() {
        let video: VideoResponse = serde_json::from_str(VIDEO).unwrap();
        let base = Url::parse("https://yewtu.be").unwrap();
        let meta = metadata_from(video, &base);
        assert_eq!(meta.thumbnail, "https://yewtu.be/vi/abc12345678/maxres.jpg");
        assert_eq!(meta.duration_secs, 125);
    }

    #[test]
    fn test_metadata_only_and_gated() {
        let provider = provider(vec!["https://yewtu.be".to_string()]);
        assert!(provider.supports(Operation::Metadata));
        assert!(!provider.supports(Operation::Audio));
        assert_eq!(provider.gated_on(), Some(ErrorCategory::AutomatedTrafficSuspected));
        assert!(provider.kind().is_last_resort());
    }

    #[test]
    fn test_rejects_bad_instance_url() {
        let result = InvidiousProvider::new(InvidiousConfig {
            instances: vec!["not a url".to_string()],
            ..InvidiousConfig::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_first_healthy_instance_wins() {
        let down = serve(Router::new().route(
            "/api/v1/videos/{id}",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;
        let up = serve(Router::new().route(
            "/api/v1/videos/{id}",
            get(|Path(id): Path<String>| async move {
                assert_eq!(id, "abc12345678");
                ([(axum::http::header::CONTENT_TYPE, "application/json")], VIDEO).into_response()
            }),
        ))
        .await;

        let meta = provider(vec![down, up.clone()])
            .fetch_metadata(&reference())
            .await
            .unwrap();
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.author, "Artist");
        assert!(meta.thumbnail.starts_with(&up));
    }

    #[tokio::test]
    async fn test_not_found_is_authoritative() {
        let missing = serve(Router::new().route(
            "/api/v1/videos/{id}",
            get(|| async { (StatusCode::NOT_FOUND, r#"{"error":"Video unavailable"}"#) }),
        ))
        .await;
        let never = serve(Router::new().route(
            "/api/v1/videos/{id}",
            get(|| async { let r: () = panic!("second instance must not be queried"); #[allow(unreachable_code)] r }),
        ))
        .await;

        let err = provider(vec![missing, never])
            .fetch_metadata(&reference())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_audio_is_unsupported() {
        let provider = provider(vec!["https://yewtu.be".to_string()]);
        let err = provider.fetch_audio(&reference()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }
}
