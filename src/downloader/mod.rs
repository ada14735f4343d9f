// Downloader module - provider chain, classification and transcoding

pub mod diagnostics;
pub mod errors;
pub mod extractors;
pub mod models;
pub mod orchestrator;
pub mod reference;
pub mod spool;
pub mod tools;
pub mod traits;
pub mod transcoder;
pub mod utils;

#[cfg(test)]
pub mod testing;

pub use diagnostics::ErrorClassifier;
pub use errors::{ClassifiedError, ErrorCategory, ProviderError, Unavailability};
pub use models::{AudioSource, FormatHint, Handoff, Operation, ProviderAttempt, VideoMetadata};
pub use orchestrator::{ProviderChain, Resolution};
pub use reference::{validate, VideoId, VideoReference};
pub use traits::{ExtractionProvider, ProviderKind};
pub use transcoder::{ProcessTranscoder, TargetFormat, TranscodeOptions, TranscodeStream, Transcoder};
