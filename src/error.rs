//! Error handling

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::{error, info};

use crate::pipeline::Stage;
use crate::providers::ProviderError;

/// Failure categories for a generation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Missing or blank prompt
    InvalidInput,
    /// The image generator failed or returned nothing usable
    GenerationFailed,
    /// Fetching, decoding, compositing or encoding the image failed
    CompositeFailed,
    /// Storing the image failed
    UploadFailed,
    /// A provider couldn't be reached at all
    UpstreamUnavailable,
}

impl ErrorKind {
    /// HTTP status reported to callers
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::GenerationFailed | Self::UploadFailed => StatusCode::BAD_GATEWAY,
            Self::CompositeFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to untrusted callers
    pub fn public_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "A prompt is required to generate an image.",
            Self::GenerationFailed => "Image generation failed.",
            Self::CompositeFailed => "Failed to add the logo to the image.",
            Self::UploadFailed => "Failed to store the generated image.",
            Self::UpstreamUnavailable => "An upstream service is unavailable, try again later.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidInput => "invalid_input",
            Self::GenerationFailed => "generation_failed",
            Self::CompositeFailed => "composite_failed",
            Self::UploadFailed => "upload_failed",
            Self::UpstreamUnavailable => "upstream_unavailable",
        };
        f.write_str(name)
    }
}

/// A pipeline run that stopped at `stage`.
#[derive(Debug)]
pub struct PipelineError {
    /// Stage that failed
    pub stage: Stage,
    /// What went wrong
    pub kind: ErrorKind,
    /// Internal detail, for logs only
    pub detail: String,
}

impl PipelineError {
    /// Creates an error
    pub fn new(stage: Stage, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            detail: detail.into(),
        }
    }

    /// Wraps a provider failure: transport failures become
    /// [`ErrorKind::UpstreamUnavailable`], anything else `kind`.
    pub fn from_provider(stage: Stage, kind: ErrorKind, err: &ProviderError) -> Self {
        let kind = if err.is_transport() {
            ErrorKind::UpstreamUnavailable
        } else {
            kind
        };
        Self::new(stage, kind, err.to_string())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.stage, self.detail)
    }
}

impl std::error::Error for PipelineError {}

/// definitions for the artmind web application.
#[derive(Debug)]
pub enum ArtmindError {
    /// The request was malformed, message is shown to the caller
    BadRequest(String),
    /// A decoupled step ran before the step that feeds it
    MissingSessionData(&'static str),
    /// A pipeline run failed
    Pipeline(PipelineError),
    /// Transcription or translation failed
    Upstream(ProviderError),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<PipelineError> for ArtmindError {
    fn from(err: PipelineError) -> Self {
        ArtmindError::Pipeline(err)
    }
}

impl From<ProviderError> for ArtmindError {
    fn from(err: ProviderError) -> Self {
        ArtmindError::Upstream(err)
    }
}

impl From<tower_sessions::session::Error> for ArtmindError {
    fn from(err: tower_sessions::session::Error) -> Self {
        ArtmindError::InternalServerError(format!("Session error: {err}"))
    }
}

impl From<std::io::Error> for ArtmindError {
    fn from(err: std::io::Error) -> Self {
        ArtmindError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ArtmindError {
    fn from(err: axum::http::Error) -> Self {
        ArtmindError::InternalServerError(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ArtmindError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ArtmindError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl fmt::Display for ArtmindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "Bad request: {message}"),
            Self::MissingSessionData(what) => write!(f, "Missing session data: {what}"),
            Self::Pipeline(err) => write!(f, "{err}"),
            Self::Upstream(err) => write!(f, "{err}"),
            Self::InternalServerError(message) => write!(f, "Internal server error: {message}"),
        }
    }
}

impl std::error::Error for ArtmindError {}

/// The `{ "error": ... }` envelope every failure is reported with
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    /// Caller-safe message
    pub error: String,
}

impl ArtmindError {
    /// Status and caller-safe message, logging the internal detail.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ArtmindError::BadRequest(message) => {
                info!("Bad request received: {message}");
                (StatusCode::BAD_REQUEST, message.clone())
            }
            ArtmindError::MissingSessionData(what) => {
                info!("Request out of order, missing {what}");
                (StatusCode::CONFLICT, format!("No {what} available in this session yet."))
            }
            ArtmindError::Pipeline(err) => {
                if err.kind == ErrorKind::InvalidInput {
                    info!("Pipeline rejected input: {err}");
                } else {
                    error!("Pipeline failed: {err}");
                }
                (err.kind.status_code(), err.kind.public_message().to_string())
            }
            ArtmindError::Upstream(err) => {
                error!("Provider error: {err}");
                if err.is_transport() {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorKind::UpstreamUnavailable.public_message().to_string(),
                    )
                } else {
                    (
                        StatusCode::BAD_GATEWAY,
                        "The speech or translation service failed.".to_string(),
                    )
                }
            }
            ArtmindError::InternalServerError(message) => {
                error!("Internal server error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ArtmindError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorBody { error })).into_response()
    }
}
