use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::plates::ErrorResponse;
use thiserror::Error;

/// Failure kinds of the plate analysis service.
///
/// Only `InvalidInput`, `Timeout` and `Internal` reach HTTP callers.
/// `ModelUnavailable` stops the process at startup, and `InvalidRegion` and
/// `RecognitionFailure` are recovered inside the pipeline as an empty result.
#[derive(Debug, Error)]
pub enum AnprError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("recognition failure: {0}")]
    RecognitionFailure(String),

    #[error("analysis timed out after {0}s")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnprError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegion(msg.into())
    }

    pub fn recognition_failure(msg: impl Into<String>) -> Self {
        Self::RecognitionFailure(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable name, also used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            AnprError::InvalidInput(_) => "invalid_input",
            AnprError::ModelUnavailable(_) => "model_unavailable",
            AnprError::InvalidRegion(_) => "invalid_region",
            AnprError::RecognitionFailure(_) => "recognition_failure",
            AnprError::Timeout(_) => "timeout",
            AnprError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AnprError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AnprError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AnprError::ModelUnavailable(_)
            | AnprError::InvalidRegion(_)
            | AnprError::RecognitionFailure(_)
            | AnprError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnprError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        });

        (self.status_code(), body).into_response()
    }
}

impl From<anyhow::Error> for AnprError {
    fn from(err: anyhow::Error) -> Self {
        AnprError::internal(format!("{:#}", err))
    }
}
