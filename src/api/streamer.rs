// Response streamer: owns the "headers sent" decision of one response
//
// Until commit, any failure can still become a status code and a JSON
// body. After commit the status line is gone; a failure can only end the
// body with an error, which makes hyper abort the connection instead of
// finishing a truncated download cleanly.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use super::error::ApiError;
use crate::downloader::errors::ClassifiedError;
use crate::downloader::models::ByteStream;
use crate::downloader::transcoder::TargetFormat;
use crate::downloader::utils::content_disposition;

/// Request-scoped "headers sent" flag; flips once, never back
#[derive(Debug, Clone, Default)]
pub struct CommitState(Arc<AtomicBool>);

impl CommitState {
    pub fn is_committed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn commit(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// What to do with a failure, given the commit state
#[derive(Debug)]
pub enum FailureDisposition {
    /// Not committed yet: send this response instead
    Respond(Response),
    /// Already committed: tear the connection down
    Abort,
}

impl IntoResponse for FailureDisposition {
    fn into_response(self) -> Response {
        match self {
            Self::Respond(response) => response,
            Self::Abort => Response::new(Body::from_stream(stream::once(async {
                Err::<Bytes, io::Error>(io::Error::other("response aborted after commit"))
            }))),
        }
    }
}

#[derive(Debug, Default)]
pub struct ResponseStreamer {
    commit: CommitState,
}

impl ResponseStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_state(&self) -> CommitState {
        self.commit.clone()
    }

    /// Start a streamed response once the first chunk is in hand
    ///
    /// A body that fails or ends before producing anything is returned as
    /// an error so the caller can still answer with a status code.
    pub async fn stream(&self, headers: HeaderMap, mut body: ByteStream) -> Result<Response, ClassifiedError> {
        let first = match body.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(classified_from_io(e)),
            None => return Err(ClassifiedError::transcode_failure("encoder produced no output")),
        };

        self.commit.commit();
        tracing::debug!(first_chunk = first.len(), "response committed");

        let rest = stream::once(async move { Ok(first) }).chain(body).inspect_err(|e| {
            tracing::error!(error = %e, "stream failed after commit, aborting connection");
        });

        let mut response = Response::new(Body::from_stream(rest));
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Decide how a failure reaches the client
    pub fn fail(&self, err: ClassifiedError) -> FailureDisposition {
        if self.commit.is_committed() {
            tracing::error!(category = %err.category, error = %err, "failure after commit, aborting connection");
            return FailureDisposition::Abort;
        }

        tracing::warn!(category = %err.category, error = %err, "request failed");
        FailureDisposition::Respond(ApiError::from(err).into_response())
    }
}

/// Unwrap the classified error an `io::Error` carries, if any
pub fn classified_from_io(err: io::Error) -> ClassifiedError {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<ClassifiedError>())
        .cloned()
        .unwrap_or_else(|| ClassifiedError::transcode_failure(err.to_string()))
}

/// Headers of a file download named after `title`
pub fn download_headers(title: &str, format: TargetFormat) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let disposition = content_disposition(title, format.extension);
    let value = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(CONTENT_DISPOSITION, value);
    headers
}
