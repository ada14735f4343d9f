// Video reference validation
//
// Purely syntactic: no network, no subprocess. Runs before any provider so
// malformed input never costs an upstream request or a process spawn.

use std::fmt;

use regex::Regex;
use url::Url;

use super::errors::ClassifiedError;

lazy_static::lazy_static! {
    /// Primary and short-link domains, with or without scheme / `www.` / `m.`
    static ref ACCEPTED_URL: Regex = Regex::new(
        r"(?i)^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)/\S+$"
    ).unwrap();

    /// Watch, short-link, embed, shorts and live shapes
    static ref VIDEO_ID: Regex = Regex::new(
        r"(?:[?&]v=|youtu\.be/|/(?:embed|shorts|v|live)/)([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)"
    ).unwrap();
}

/// Stable 11-character platform identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated video reference; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    raw: String,
    normalized: Url,
    video_id: Option<VideoId>,
}

impl VideoReference {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &Url {
        &self.normalized
    }

    /// May be absent when the URL shape is accepted but carries no id
    pub fn video_id(&self) -> Option<&VideoId> {
        self.video_id.as_ref()
    }

    /// Canonical watch URL when the id is known, the normalized URL otherwise
    pub fn watch_url(&self) -> String {
        match &self.video_id {
            Some(id) => format!("https://www.youtube.com/watch?v={}", id),
            None => self.normalized.to_string(),
        }
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

/// Validate a raw reference string
pub fn validate(raw: &str) -> Result<VideoReference, ClassifiedError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(ClassifiedError::invalid_input("empty video reference"));
    }

    if !ACCEPTED_URL.is_match(trimmed) {
        return Err(ClassifiedError::invalid_input(format!(
            "not a YouTube URL: {}",
            trimmed
        )));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let normalized = Url::parse(&with_scheme)
        .map_err(|e| ClassifiedError::invalid_input(format!("malformed URL: {}", e)))?;

    let video_id = VIDEO_ID
        .captures(normalized.as_str())
        .and_then(|caps| caps.get(1))
        .map(|m| VideoId(m.as_str().to_string()));

    Ok(VideoReference {
        raw: raw.to_string(),
        normalized,
        video_id,
    })
}

fn has_scheme(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
