// API error type, rendered as `{ "error": "<message>" }`
//
// Messages are in French, like the web UI that consumes them.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::downloader::errors::{ClassifiedError, ErrorCategory, Unavailability};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Status code for a classified failure
    pub fn status_for(err: &ClassifiedError) -> StatusCode {
        match err.category {
            ErrorCategory::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCategory::VideoUnavailable => match err.unavailability {
                Some(Unavailability::Private) => StatusCode::FORBIDDEN,
                Some(Unavailability::Removed) | None => StatusCode::NOT_FOUND,
            },
            ErrorCategory::AgeRestricted | ErrorCategory::AutomatedTrafficSuspected => {
                StatusCode::FORBIDDEN
            }
            ErrorCategory::ProviderUnavailable
            | ErrorCategory::UpstreamFormatChanged
            | ErrorCategory::NetworkFailure => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::TranscodeFailure | ErrorCategory::ExtractionFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message_for(err: &ClassifiedError) -> &'static str {
        match (err.category, err.unavailability) {
            (ErrorCategory::InvalidInput, _) => "URL YouTube invalide",
            (ErrorCategory::VideoUnavailable, Some(Unavailability::Private)) => {
                "Cette vidéo est privée ou son accès est restreint"
            }
            (ErrorCategory::VideoUnavailable, _) => "Vidéo introuvable ou supprimée",
            (ErrorCategory::AgeRestricted, _) => {
                "Cette vidéo est soumise à une limite d'âge et ne peut pas être récupérée"
            }
            (ErrorCategory::AutomatedTrafficSuspected, _) => {
                "YouTube a bloqué la requête (détection de robot). Réessayez plus tard."
            }
            (ErrorCategory::UpstreamFormatChanged, _) | (ErrorCategory::ProviderUnavailable, _) => {
                "Service temporairement indisponible. Réessayez plus tard."
            }
            (ErrorCategory::NetworkFailure, _) => "Impossible de joindre YouTube. Vérifiez la connexion réseau.",
            (ErrorCategory::TranscodeFailure, _) => {
                "Erreur lors de la conversion MP3. Vérifiez que FFmpeg est correctement installé."
            }
            (ErrorCategory::ExtractionFailed, _) => {
                "Erreur lors de la récupération des informations de la vidéo"
            }
        }
    }
}

impl From<ClassifiedError> for ApiError {
    fn from(err: ClassifiedError) -> Self {
        Self::new(Self::status_for(&err), Self::message_for(&err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        Self::bad_request("URL YouTube invalide")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
