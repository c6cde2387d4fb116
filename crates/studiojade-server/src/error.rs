//! HTTP error responses for the telemetry endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use studiojade_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The submitted sample was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(ValidationError::UnsupportedMediaType) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::Validation(ValidationError::PayloadTooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Validation(ValidationError::BodyUnreadable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let err = match rejection {
            JsonRejection::MissingJsonContentType(_) => ValidationError::UnsupportedMediaType,
            JsonRejection::JsonSyntaxError(e) => ValidationError::NotJson(e.body_text()),
            JsonRejection::JsonDataError(e) => ValidationError::NotJson(e.body_text()),
            JsonRejection::BytesRejection(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ValidationError::PayloadTooLarge(e.body_text())
            }
            JsonRejection::BytesRejection(e) => ValidationError::BodyUnreadable(e.body_text()),
            other => ValidationError::BodyUnreadable(other.body_text()),
        };
        Self::Validation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Telemetry request failed");
        } else {
            tracing::debug!(error = %self, "Telemetry sample rejected");
        }
        let body = json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
