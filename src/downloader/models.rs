// Common data models for extraction and streaming

use std::fmt;
use std::io;

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;

use super::errors::{ClassifiedError, ErrorCategory};
use super::spool::SpoolFile;

/// Ordered byte chunks with an I/O error channel
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// What the chain is being asked to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Metadata,
    Audio,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => write!(f, "metadata"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Descriptive metadata; built fresh per request and never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub author: String,
    pub duration_secs: u64,
    /// Highest-resolution thumbnail available
    pub thumbnail: String,
    pub view_count: u64,
}

/// Thumbnail candidate as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Thumbnail {
    fn area(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }

    /// Largest by pixel area; on ties (or unknown sizes) the later entry wins,
    /// since providers list thumbnails from smallest to largest
    pub fn best(candidates: &[Thumbnail]) -> Option<&Thumbnail> {
        candidates
            .iter()
            .filter(|t| !t.url.is_empty())
            .fold(None, |best: Option<&Thumbnail>, t| match best {
                Some(b) if b.area() > t.area() => Some(b),
                _ => Some(t),
            })
    }
}

/// Best-effort container/codec hint; diagnostics only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatHint {
    pub container: Option<String>,
    pub codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
}

impl FormatHint {
    /// Parse a MIME type like `audio/webm; codecs="opus"`
    pub fn from_mime(mime: &str) -> Self {
        let mut parts = mime.split(';');
        let container = parts
            .next()
            .and_then(|m| m.trim().split('/').nth(1))
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let codec = parts
            .filter_map(|p| p.trim().strip_prefix("codecs="))
            .map(|c| c.trim_matches('"').to_string())
            .next();

        Self {
            container,
            codec,
            bitrate_kbps: None,
        }
    }

    pub fn with_bitrate(mut self, kbps: Option<u32>) -> Self {
        self.bitrate_kbps = kbps;
        self
    }
}

impl fmt::Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.container.as_deref().unwrap_or("?"),
            self.codec.as_deref().unwrap_or("?")
        )?;
        if let Some(kbps) = self.bitrate_kbps {
            write!(f, "@{}k", kbps)?;
        }
        Ok(())
    }
}

/// How the audio bytes are handed to the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Piped straight through
    Streaming,
    /// Written to a temporary store first, then read back
    Spooled,
}

enum AudioBody {
    Streaming(ByteStream),
    Spooled(SpoolFile),
}

/// Single-read, non-seekable audio byte source
///
/// Owned by the provider that produced it until handed to the transcoder.
/// Dropping it releases whatever backs it (child process, temp file).
pub struct AudioSource {
    provider: &'static str,
    hint: FormatHint,
    body: AudioBody,
}

impl AudioSource {
    pub fn streaming<S>(provider: &'static str, stream: S, hint: FormatHint) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            provider,
            hint,
            body: AudioBody::Streaming(stream.boxed()),
        }
    }

    pub fn spooled(provider: &'static str, spool: SpoolFile, hint: FormatHint) -> Self {
        Self {
            provider,
            hint,
            body: AudioBody::Spooled(spool),
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn hint(&self) -> &FormatHint {
        &self.hint
    }

    pub fn handoff(&self) -> Handoff {
        match self.body {
            AudioBody::Streaming(_) => Handoff::Streaming,
            AudioBody::Spooled(_) => Handoff::Spooled,
        }
    }

    /// Consume the source into its byte stream
    ///
    /// For a spooled source the temp store lives exactly as long as the
    /// returned stream.
    pub async fn into_stream(self) -> io::Result<ByteStream> {
        match self.body {
            AudioBody::Streaming(stream) => Ok(stream),
            AudioBody::Spooled(spool) => spool.into_stream().await,
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("provider", &self.provider)
            .field("hint", &self.hint)
            .field("handoff", &self.handoff())
            .finish()
    }
}

/// Result of one provider attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(ClassifiedError),
}

/// Diagnostic record of one attempt; lives for the request only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: &'static str,
    pub operation: Operation,
    pub outcome: AttemptOutcome,
}

impl ProviderAttempt {
    pub fn category(&self) -> Option<ErrorCategory> {
        match &self.outcome {
            AttemptOutcome::Succeeded => None,
            AttemptOutcome::Failed(err) => Some(err.category),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(url: &str, w: u32, h: u32) -> Thumbnail {
        Thumbnail {
            url: url.to_string(),
            width: Some(w),
            height: Some(h),
        }
    }

    #[test]
    fn test_best_thumbnail_by_area() {
        let list = vec![
            thumb("a", 120, 90),
            thumb("b", 1280, 720),
            thumb("c", 480, 360),
        ];
        assert_eq!(Thumbnail::best(&list).unwrap().url, "b");
    }

    #[test]
    fn test_best_thumbnail_unknown_sizes_takes_last() {
        let list = vec![
            Thumbnail {
                url: "first".to_string(),
                width: None,
                height: None,
            },
            Thumbnail {
                url: "last".to_string(),
                width: None,
                height: None,
            },
        ];
        assert_eq!(Thumbnail::best(&list).unwrap().url, "last");
        assert!(Thumbnail::best(&[]).is_none());
    }

    #[test]
    fn test_format_hint_from_mime() {
        let hint = FormatHint::from_mime("audio/webm; codecs=\"opus\"").with_bitrate(Some(160));
        assert_eq!(hint.container.as_deref(), Some("webm"));
        assert_eq!(hint.codec.as_deref(), Some("opus"));
        assert_eq!(hint.to_string(), "webm/opus@160k");
    }

    #[tokio::test]
    async fn test_streaming_source_yields_bytes() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let source = AudioSource::streaming("stub", futures::stream::iter(chunks), FormatHint::default());
        assert_eq!(source.handoff(), Handoff::Streaming);

        let collected: Vec<Bytes> = source
            .into_stream()
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(collected.concat(), b"abcd");
    }
}
