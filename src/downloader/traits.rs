// Extraction provider trait definition

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use super::errors::{ErrorCategory, ProviderError};
use super::models::{AudioSource, Operation, VideoMetadata};
use super::reference::VideoReference;

/// Transport family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-process resolver, no subprocess
    Library,
    /// Shells out to an external extraction tool
    Subprocess,
    /// Third-party read-only API, consulted last
    FallbackApi,
}

impl ProviderKind {
    /// Unmatched failures from a last-resort provider are not retried
    pub fn is_last_resort(self) -> bool {
        matches!(self, Self::FallbackApi)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Subprocess => write!(f, "subprocess"),
            Self::FallbackApi => write!(f, "fallback-api"),
        }
    }
}

/// One strategy for resolving metadata and/or audio from a video reference
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Name of the provider (for logging and attempt records)
    fn name(&self) -> &'static str;

    fn kind(&self) -> ProviderKind;

    /// Cheap, side-effect-free capability check
    async fn is_available(&self) -> bool;

    /// Whether this provider offers the operation at all
    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    /// Only attempt this provider after an earlier attempt in the same
    /// resolution was classified with this category
    fn gated_on(&self) -> Option<ErrorCategory> {
        None
    }

    async fn fetch_metadata(&self, reference: &VideoReference)
        -> Result<VideoMetadata, ProviderError>;

    async fn fetch_audio(&self, reference: &VideoReference) -> Result<AudioSource, ProviderError>;
}
