// Error classification - maps raw provider failures onto the taxonomy
//
// Different providers describe the same condition in different words
// (yt-dlp stderr, player endpoint playability reasons, HTTP statuses).
// The table below is matched in order; the first hit wins.

use regex::Regex;

use super::errors::{ClassifiedError, ErrorCategory, ProviderError, Unavailability};
use super::traits::ProviderKind;

lazy_static::lazy_static! {
    /// `[youtube] <id>: ` as the extraction tool prefixes its messages; the
    /// id is arbitrary text and must not take part in matching
    static ref EXTRACTOR_PREFIX: Regex = Regex::new(r"\[[\w:.-]+\]\s+[\w-]+:\s").unwrap();
}

/// One row of the classification table
struct Rule {
    category: ErrorCategory,
    unavailability: Option<Unavailability>,
    /// Matched as substrings
    patterns: &'static [&'static str],
    /// Short tokens, matched as whole words only
    words: &'static [&'static str],
}

const RULES: &[Rule] = &[
    // Bot checks come first: "Sign in to confirm you're not a bot" must not
    // fall into the age or private buckets below.
    Rule {
        category: ErrorCategory::AutomatedTrafficSuspected,
        unavailability: None,
        patterns: &[
            "not a bot",
            "confirm you’re not a bot",
            "captcha",
            "unusual traffic",
            "automated queries",
            "automated access",
            "too many requests",
            "rate limit",
            "rate-limit",
            "http error 429",
            "http 429",
            "po token",
            "proof of origin",
        ],
        words: &["sabr"],
    },
    Rule {
        category: ErrorCategory::AgeRestricted,
        unavailability: None,
        patterns: &[
            "age-restricted",
            "age restricted",
            "sign in to confirm your age",
            "age_verification",
            "inappropriate for some users",
            "age_check_required",
        ],
        words: &[],
    },
    Rule {
        category: ErrorCategory::VideoUnavailable,
        unavailability: Some(Unavailability::Private),
        patterns: &[
            "private video",
            "video is private",
            "sign in if you've been granted access",
            "members only",
            "members-only",
            "join this channel",
            "available to members",
            "not available in your country",
            "blocked in your country",
            "requires payment",
            "requires purchase",
        ],
        words: &["drm"],
    },
    Rule {
        category: ErrorCategory::VideoUnavailable,
        unavailability: Some(Unavailability::Removed),
        patterns: &[
            "video unavailable",
            "video is unavailable",
            "has been removed",
            "no longer available",
            "account associated with this video has been terminated",
            "does not exist",
            "http error 404",
            "http 404",
            "http 410",
        ],
        words: &[],
    },
    Rule {
        category: ErrorCategory::InvalidInput,
        unavailability: None,
        patterns: &["unsupported url", "is not a valid url", "incomplete youtube id"],
        words: &[],
    },
    Rule {
        category: ErrorCategory::UpstreamFormatChanged,
        unavailability: None,
        patterns: &[
            "unexpected response shape",
            "unable to extract",
            "failed to parse",
            "nsig extraction failed",
            "signature extraction failed",
            "only ciphered formats",
            "no audio formats",
            "invalid json",
        ],
        words: &[],
    },
    // Generic 403 after the specific private/bot wording had its chance
    Rule {
        category: ErrorCategory::AutomatedTrafficSuspected,
        unavailability: None,
        patterns: &["http error 403", "http 403", "forbidden"],
        words: &[],
    },
    Rule {
        category: ErrorCategory::NetworkFailure,
        unavailability: None,
        patterns: &[
            "timed out",
            "timeout",
            "connection refused",
            "connection reset",
            "network unreachable",
            "network is unreachable",
            "name or service not known",
            "temporary failure in name resolution",
            "failed to resolve",
            "dns error",
            "getaddrinfo",
            "unable to download webpage",
        ],
        words: &[],
    },
];

/// Maps raw provider failures into `ClassifiedError`s
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw provider failure
    ///
    /// Unmatched errors become `ExtractionFailed`, retryable unless the
    /// provider is the last resort of its chain.
    pub fn classify(&self, raw: &ProviderError, kind: ProviderKind) -> ClassifiedError {
        if let Some(classified) = Self::structural(raw) {
            return classified;
        }

        let text = raw.to_string();
        if let Some(classified) = Self::match_table(&text) {
            return classified;
        }

        ClassifiedError::new(ErrorCategory::ExtractionFailed, text)
            .with_retryable(!kind.is_last_resort())
    }

    /// Classification decided by the error variant or status code alone
    fn structural(raw: &ProviderError) -> Option<ClassifiedError> {
        let text = raw.to_string();
        match raw {
            ProviderError::Classified(classified) => Some(classified.clone()),
            // One provider's missing tool says nothing about the others
            ProviderError::Spawn { .. } | ProviderError::Unsupported(_) => {
                Some(ClassifiedError::provider_unavailable(text).with_retryable(true))
            }
            ProviderError::Timeout(_) => {
                Some(ClassifiedError::new(ErrorCategory::NetworkFailure, text))
            }
            ProviderError::Transport { timeout, connect, .. } if *timeout || *connect => {
                Some(ClassifiedError::new(ErrorCategory::NetworkFailure, text))
            }
            ProviderError::Parse(_) => {
                Some(ClassifiedError::new(ErrorCategory::UpstreamFormatChanged, text))
            }
            ProviderError::Http { status, .. } => match status {
                404 | 410 => Some(ClassifiedError::video_removed(text)),
                429 => Some(ClassifiedError::new(
                    ErrorCategory::AutomatedTrafficSuspected,
                    text,
                )),
                500..=599 => Some(ClassifiedError::new(ErrorCategory::NetworkFailure, text)),
                // 403 and friends go through the text table: the body may say why
                _ => None,
            },
            _ => None,
        }
    }

    fn match_table(text: &str) -> Option<ClassifiedError> {
        let lower = text.to_lowercase();
        let lower = EXTRACTOR_PREFIX.replace_all(&lower, "");

        RULES
            .iter()
            .find(|rule| {
                rule.patterns.iter().any(|p| lower.contains(p))
                    || rule.words.iter().any(|w| contains_word(&lower, w))
            })
            .map(|rule| {
                let mut classified = ClassifiedError::new(rule.category, text);
                classified.unavailability = rule.unavailability;
                classified
            })
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
