// InnerTube provider - in-process resolver for the platform's player endpoint
//
// One POST to the player endpoint yields both the video details and the
// adaptive format list, so metadata and audio share the same request code.
// Audio is streamed straight from the selected format URL; formats that
// need signature deciphering are not handled.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::downloader::errors::{ClassifiedError, ErrorCategory, ProviderError};
use crate::downloader::models::{AudioSource, FormatHint, Thumbnail, VideoMetadata};
use crate::downloader::reference::{VideoId, VideoReference};
use crate::downloader::traits::{ExtractionProvider, ProviderKind};

pub const DEFAULT_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";

const CLIENT_NAME: &str = "ANDROID";
const CLIENT_ID: &str = "3";
const CLIENT_VERSION: &str = "19.09.37";
const ANDROID_SDK: u32 = 30;
const CLIENT_USER_AGENT: &str = "com.google.android.youtube/19.09.37 (Linux; U; Android 11) gzip";

/// Characters of an error body kept for diagnostics
const BODY_EXCERPT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnertubeConfig {
    pub endpoint: String,
    pub proxy: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated while a media body is streaming
    pub read_timeout_secs: u64,
}

impl Default for InnertubeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proxy: None,
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

pub struct InnertubeProvider {
    endpoint: String,
    /// Player requests, bounded end to end
    api: reqwest::Client,
    /// Media downloads: no total bound since a body may take minutes, but a
    /// stalled read fails the stream
    media: reqwest::Client,
}

impl InnertubeProvider {
    pub fn new(config: InnertubeConfig) -> Result<Self, ProviderError> {
        let mut api = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        let mut media = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs));

        if let Some(proxy) = &config.proxy {
            api = api.proxy(reqwest::Proxy::all(proxy)?);
            media = media.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            endpoint: config.endpoint,
            api: api.build()?,
            media: media.build()?,
        })
    }

    async fn player(&self, reference: &VideoReference) -> Result<PlayerResponse, ProviderError> {
        let id = video_id(reference)?;
        let body = json!({
            "videoId": id.as_str(),
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "androidSdkVersion": ANDROID_SDK,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let response = self
            .api
            .post(&self.endpoint)
            .header("X-YouTube-Client-Name", CLIENT_ID)
            .header("X-YouTube-Client-Version", CLIENT_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                endpoint: "player".to_string(),
                body: text.chars().take(BODY_EXCERPT).collect(),
            });
        }

        let text = response.text().await?;
        let player = parse_player_response(&text)?;
        player.ensure_playable()?;
        Ok(player)
    }
}

fn video_id(reference: &VideoReference) -> Result<&VideoId, ProviderError> {
    reference.video_id().ok_or_else(|| {
        ProviderError::Classified(ClassifiedError::new(
            ErrorCategory::ExtractionFailed,
            format!("no video id in {}", reference),
        ))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    video_details: Option<VideoDetails>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    title: Option<String>,
    author: Option<String>,
    length_seconds: Option<String>,
    view_count: Option<String>,
    thumbnail: Option<ThumbnailList>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailList {
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    adaptive_formats: Vec<AdaptiveFormat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptiveFormat {
    itag: Option<u32>,
    url: Option<String>,
    mime_type: String,
    bitrate: Option<u64>,
    signature_cipher: Option<String>,
}

fn parse_player_response(text: &str) -> Result<PlayerResponse, ProviderError> {
    Ok(serde_json::from_str(text)?)
}

impl PlayerResponse {
    fn ensure_playable(&self) -> Result<(), ProviderError> {
        let status = self
            .playability_status
            .as_ref()
            .ok_or_else(|| ProviderError::Parse("missing playabilityStatus".to_string()))?;

        if status.status == "OK" {
            return Ok(());
        }

        Err(ProviderError::Playability {
            status: status.status.clone(),
            reason: status.reason.clone().unwrap_or_default(),
        })
    }

    fn metadata(&self) -> Result<VideoMetadata, ProviderError> {
        let details = self
            .video_details
            .as_ref()
            .ok_or_else(|| ProviderError::Parse("missing videoDetails".to_string()))?;

        let thumbnails: Vec<Thumbnail> = details
            .thumbnail
            .as_ref()
            .map(|list| {
                list.thumbnails
                    .iter()
                    .map(|t| Thumbnail {
                        url: t.url.clone(),
                        width: t.width,
                        height: t.height,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(VideoMetadata {
            title: non_empty(details.title.as_deref()).unwrap_or("Unknown Title").to_string(),
            author: non_empty(details.author.as_deref()).unwrap_or("Unknown Author").to_string(),
            duration_secs: parse_count(details.length_seconds.as_deref()),
            thumbnail: Thumbnail::best(&thumbnails).map(|t| t.url.clone()).unwrap_or_default(),
            view_count: parse_count(details.view_count.as_deref()),
        })
    }

    fn best_audio(&self) -> Result<AdaptiveFormat, ProviderError> {
        let formats = self
            .streaming_data
            .as_ref()
            .map(|d| d.adaptive_formats.as_slice())
            .unwrap_or_default();
        select_audio_format(formats).cloned()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Counts come back as decimal strings; anything unparseable is 0
fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Highest-bitrate audio-only format that has a direct URL
fn select_audio_format(formats: &[AdaptiveFormat]) -> Result<&AdaptiveFormat, ProviderError> {
    let audio: Vec<&AdaptiveFormat> = formats
        .iter()
        .filter(|f| f.mime_type.starts_with("audio/"))
        .collect();

    if audio.is_empty() {
        return Err(ProviderError::Parse("no audio formats in streamingData".to_string()));
    }

    audio
        .into_iter()
        .filter(|f| f.url.is_some() && f.signature_cipher.is_none())
        .max_by_key(|f| f.bitrate.unwrap_or(0))
        .ok_or_else(|| ProviderError::Parse("only ciphered formats available".to_string()))
}

#[async_trait]
impl ExtractionProvider for InnertubeProvider {
    fn name(&self) -> &'static str {
        "innertube"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Library
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn fetch_metadata(&self, reference: &VideoReference) -> Result<VideoMetadata, ProviderError> {
        self.player(reference).await?.metadata()
    }

    async fn fetch_audio(&self, reference: &VideoReference) -> Result<AudioSource, ProviderError> {
        let player = self.player(reference).await?;
        let format = player.best_audio()?;
        let url = format
            .url
            .as_deref()
            .ok_or_else(|| ProviderError::Parse("format without url".to_string()))?;

        tracing::debug!(
            itag = ?format.itag,
            mime = %format.mime_type,
            bitrate = ?format.bitrate,
            "selected audio format"
        );

        let response = self.media.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                endpoint: "media".to_string(),
                body: String::new(),
            });
        }

        let hint = FormatHint::from_mime(&format.mime_type)
            .with_bitrate(format.bitrate.map(|b| (b / 1000) as u32));
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(AudioSource::streaming(self.name(), body, hint))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures::StreamExt;

    use super::*;
    use crate::downloader::diagnostics::ErrorClassifier;
    use crate::downloader::errors::Unavailability;
    use crate::downloader::reference::validate;

    const PLAYER_OK: &str = r#"{
        "playabilityStatus": {"status": "OK"},
        "videoDetails": {
            "videoId": "abc12345678",
            "title": "Song",
            "author": "Artist",
            "lengthSeconds": "125",
            "viewCount": "1000",
            "thumbnail": {"thumbnails": [
                {"url": "https://i.ytimg.com/vi/abc12345678/default.jpg", "width": 120, "height": 90},
                {"url": "https://i.ytimg.com/vi/abc12345678/maxresdefault.jpg", "width": 1280, "height": 720}
            ]}
        },
        "streamingData": {"adaptiveFormats": [
            {"itag": 137, "url": "https://media/video", "mimeType": "video/mp4; codecs=\"avc1\"", "bitrate": 4000000},
            {"itag": 140, "url": "https://media/140", "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"", "bitrate": 130000},
            {"itag": 251, "url": "https://media/251", "mimeType": "audio/webm; codecs=\"opus\"", "bitrate": 160000},
            {"itag": 250, "signatureCipher": "s=xyz", "mimeType": "audio/webm; codecs=\"opus\"", "bitrate": 999999}
        ]}
    }"#;

    fn classify(err: &ProviderError) -> ClassifiedError {
        ErrorClassifier::new().classify(err, ProviderKind::Library)
    }

    #[test]
    fn test_metadata_from_player_response() {
        let player = parse_player_response(PLAYER_OK).unwrap();
        player.ensure_playable().unwrap();

        let meta = player.metadata().unwrap();
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.author, "Artist");
        assert_eq!(meta.duration_secs, 125);
        assert_eq!(meta.view_count, 1000);
        assert!(meta.thumbnail.ends_with("maxresdefault.jpg"));
    }

    #[test]
    fn test_best_audio_skips_video_and_ciphered() {
        let player = parse_player_response(PLAYER_OK).unwrap();
        let format = player.best_audio().unwrap();
        assert_eq!(format.itag, Some(251));
    }

    #[test]
    fn test_ciphered_only_is_format_change() {
        let player = parse_player_response(
            r#"{"playabilityStatus":{"status":"OK"},"streamingData":{"adaptiveFormats":[
                {"signatureCipher":"s=1","mimeType":"audio/webm","bitrate":1}
            ]}}"#,
        )
        .unwrap();
        let err = player.best_audio().unwrap_err();
        assert_eq!(classify(&err).category, ErrorCategory::UpstreamFormatChanged);

        let empty = parse_player_response(r#"{"playabilityStatus":{"status":"OK"}}"#).unwrap();
        assert!(empty.best_audio().unwrap_err().to_string().contains("no audio formats"));
    }

    #[test]
    fn test_playability_reasons_classify() {
        let cases = [
            (
                r#"{"playabilityStatus":{"status":"LOGIN_REQUIRED","reason":"Sign in to confirm you’re not a bot"}}"#,
                ErrorCategory::AutomatedTrafficSuspected,
            ),
            (
                r#"{"playabilityStatus":{"status":"LOGIN_REQUIRED","reason":"Sign in to confirm your age"}}"#,
                ErrorCategory::AgeRestricted,
            ),
            (
                r#"{"playabilityStatus":{"status":"ERROR","reason":"Video unavailable"}}"#,
                ErrorCategory::VideoUnavailable,
            ),
        ];

        for (body, expected) in cases {
            let err = parse_player_response(body).unwrap().ensure_playable().unwrap_err();
            assert_eq!(classify(&err).category, expected, "{}", body);
        }

        let private = parse_player_response(
            r#"{"playabilityStatus":{"status":"LOGIN_REQUIRED","reason":"This video is private"}}"#,
        )
        .unwrap()
        .ensure_playable()
        .unwrap_err();
        assert_eq!(classify(&private).unavailability, Some(Unavailability::Private));
    }

    #[test]
    fn test_missing_details_is_parse_error() {
        let player = parse_player_response(r#"{"playabilityStatus":{"status":"OK"}}"#).unwrap();
        assert!(matches!(player.metadata(), Err(ProviderError::Parse(_))));
        assert!(matches!(parse_player_response("not json"), Err(ProviderError::Parse(_))));
    }

    #[tokio::test]
    async fn test_reference_without_id_is_retryable_failure() {
        let provider = InnertubeProvider::new(InnertubeConfig::default()).unwrap();
        let reference = validate("https://www.youtube.com/@SomeChannel").unwrap();

        let err = provider.fetch_metadata(&reference).await.unwrap_err();
        let classified = classify(&err);
        assert_eq!(classified.category, ErrorCategory::ExtractionFailed);
        assert!(classified.retryable);
    }

    #[tokio::test]
    async fn test_fetch_metadata_against_local_endpoint() {
        let app = Router::new().route(
            "/player",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["videoId"], "abc12345678");
                assert_eq!(body["context"]["client"]["clientName"], "ANDROID");
                (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    PLAYER_OK,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = InnertubeProvider::new(InnertubeConfig {
            endpoint: format!("http://{}/player", addr),
            ..InnertubeConfig::default()
        })
        .unwrap();
        let reference = validate("https://youtu.be/abc12345678").unwrap();

        let meta = provider.fetch_metadata(&reference).await.unwrap();
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.view_count, 1000);
    }

    #[tokio::test]
    async fn test_stalled_media_body_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let player = format!(
            r#"{{"playabilityStatus":{{"status":"OK"}},"streamingData":{{"adaptiveFormats":[
                {{"itag":251,"url":"http://{}/media","mimeType":"audio/webm; codecs=\"opus\"","bitrate":160000}}
            ]}}}}"#,
            addr
        );

        let app = Router::new()
            .route(
                "/player",
                post(move || {
                    let player = player.clone();
                    async move { ([(axum::http::header::CONTENT_TYPE, "application/json")], player) }
                }),
            )
            .route(
                "/media",
                get(|| async {
                    // One chunk, then silence with the connection held open
                    let first = futures::stream::once(async {
                        Ok::<_, std::io::Error>(bytes::Bytes::from_static(b"opus"))
                    });
                    Body::from_stream(first.chain(futures::stream::pending()))
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = InnertubeProvider::new(InnertubeConfig {
            endpoint: format!("http://{}/player", addr),
            read_timeout_secs: 1,
            ..InnertubeConfig::default()
        })
        .unwrap();
        let reference = validate("https://youtu.be/abc12345678").unwrap();

        let source = provider.fetch_audio(&reference).await.unwrap();
        let mut body = source.into_stream().await.unwrap();
        assert_eq!(&body.next().await.unwrap().unwrap()[..], b"opus");

        let next = tokio::time::timeout(Duration::from_secs(10), body.next())
            .await
            .expect("stalled body must not hang forever");
        assert!(matches!(next, Some(Err(_))));
    }
}
