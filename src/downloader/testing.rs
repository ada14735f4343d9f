// Scripted providers for chain and endpoint tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::errors::{ClassifiedError, ErrorCategory, ProviderError};
use super::models::{AudioSource, FormatHint, Operation, VideoMetadata};
use super::reference::VideoReference;
use super::traits::{ExtractionProvider, ProviderKind};

/// What a stub does when called
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    /// Fail with an already classified error
    Fail(ClassifiedError),
    /// Fail the way a subprocess would, leaving classification to the chain
    Stderr(String),
    /// The tool vanished between the lookup and the spawn
    MissingTool,
    /// Never answer
    Hang,
}

#[derive(Debug)]
pub struct StubProvider {
    name: &'static str,
    kind: ProviderKind,
    available: bool,
    audio: bool,
    gate: Option<ErrorCategory>,
    behavior: Behavior,
    metadata: VideoMetadata,
    payload: Vec<u8>,
    calls: AtomicUsize,
}

pub fn sample_metadata() -> VideoMetadata {
    VideoMetadata {
        title: "Song".to_string(),
        author: "Artist".to_string(),
        duration_secs: 125,
        thumbnail: "https://x/y.jpg".to_string(),
        view_count: 1000,
    }
}

impl StubProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            kind: ProviderKind::Library,
            available: true,
            audio: true,
            gate: None,
            behavior: Behavior::Succeed,
            metadata: sample_metadata(),
            payload: b"ID3 stub audio payload".to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn metadata_only(mut self) -> Self {
        self.audio = false;
        self
    }

    pub fn gated_on(mut self, category: ErrorCategory) -> Self {
        self.gate = Some(category);
        self
    }

    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing(self, err: ClassifiedError) -> Self {
        self.behave(Behavior::Fail(err))
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn act(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(err) => Err(ProviderError::Classified(err.clone())),
            Behavior::Stderr(stderr) => Err(ProviderError::Exit {
                program: self.name.to_string(),
                code: Some(1),
                stderr: stderr.clone(),
            }),
            Behavior::MissingTool => Err(ProviderError::Spawn {
                program: self.name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            }),
            Behavior::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ExtractionProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn supports(&self, operation: Operation) -> bool {
        operation == Operation::Metadata || self.audio
    }

    fn gated_on(&self) -> Option<ErrorCategory> {
        self.gate
    }

    async fn fetch_metadata(&self, _reference: &VideoReference) -> Result<VideoMetadata, ProviderError> {
        self.act().await?;
        Ok(self.metadata.clone())
    }

    async fn fetch_audio(&self, _reference: &VideoReference) -> Result<AudioSource, ProviderError> {
        self.act().await?;
        let chunks = vec![Ok(Bytes::from(self.payload.clone()))];
        Ok(AudioSource::streaming(
            self.name,
            futures::stream::iter(chunks),
            FormatHint::from_mime("audio/webm; codecs=\"opus\""),
        ))
    }
}
