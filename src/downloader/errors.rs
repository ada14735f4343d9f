// Error types for extraction providers and the classified taxonomy
//
// Providers report raw `ProviderError`s. The chain turns them into
// `ClassifiedError`s at the provider boundary; nothing above the chain
// ever inspects a raw provider error.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Provider-agnostic failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Reference fails syntactic validation
    InvalidInput,

    /// Removed, private, or otherwise permanently inaccessible
    VideoUnavailable,

    /// Requires authentication the server does not hold
    AgeRestricted,

    /// Upstream rate-limited or blocked this attempt (429, bot check, ...)
    AutomatedTrafficSuspected,

    /// Upstream response shape no longer parses
    UpstreamFormatChanged,

    /// Required external capability absent or all providers exhausted
    ProviderUnavailable,

    /// External transcoding process failed
    TranscodeFailure,

    /// DNS/connection failure reaching an upstream
    NetworkFailure,

    /// Anything the classification table does not recognise
    ExtractionFailed,
}

impl ErrorCategory {
    /// Whether the next provider in a chain should be tried by default
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::AutomatedTrafficSuspected
                | Self::UpstreamFormatChanged
                | Self::NetworkFailure
                | Self::ExtractionFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::VideoUnavailable => "video_unavailable",
            Self::AgeRestricted => "age_restricted",
            Self::AutomatedTrafficSuspected => "automated_traffic_suspected",
            Self::UpstreamFormatChanged => "upstream_format_changed",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::TranscodeFailure => "transcode_failure",
            Self::NetworkFailure => "network_failure",
            Self::ExtractionFailed => "extraction_failed",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a video is unavailable; decides between 403 and 404 at the HTTP edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailability {
    /// Exists but access is denied (private, members-only, geo, DRM)
    Private,
    /// Deleted, removed, or never existed
    Removed,
}

/// A taxonomy-tagged failure, independent of the provider that produced it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category}: {message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
    pub unavailability: Option<Unavailability>,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            retryable: category.default_retryable(),
            unavailability: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InvalidInput, message)
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ProviderUnavailable, message)
    }

    pub fn transcode_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TranscodeFailure, message)
    }

    pub fn video_private(message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorCategory::VideoUnavailable, message);
        err.unavailability = Some(Unavailability::Private);
        err
    }

    pub fn video_removed(message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorCategory::VideoUnavailable, message);
        err.unavailability = Some(Unavailability::Removed);
        err
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, category: ErrorCategory) -> bool {
        self.category == category
    }
}

/// Raw failure reported by a provider, before classification
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The external tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool ran and exited unsuccessfully
    #[error("{program} exited with {}: {stderr}", exit_code_label(.code))]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// Request never got a response
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        endpoint: String,
        message: String,
        timeout: bool,
        connect: bool,
    },

    /// Upstream answered but the payload no longer has the expected shape
    #[error("unexpected response shape: {0}")]
    Parse(String),

    /// Upstream explicitly refused to play the video
    #[error("playability {status}: {reason}")]
    Playability { status: String, reason: String },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not offered by this provider
    #[error("{0}")]
    Unsupported(String),

    /// Provider already knows the category
    #[error(transparent)]
    Classified(#[from] ClassifiedError),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "signal".to_string(),
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| format!("{}{}", u.host_str().unwrap_or_default(), u.path()))
            .unwrap_or_else(|| "upstream".to_string());

        if let Some(status) = err.status() {
            return Self::Http {
                status: status.as_u16(),
                endpoint,
                body: String::new(),
            };
        }

        if err.is_decode() {
            return Self::Parse(err.to_string());
        }

        Self::Transport {
            endpoint,
            timeout: err.is_timeout(),
            connect: err.is_connect(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
