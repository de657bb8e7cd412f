//! Error types for the overlay server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfoverlay_core::OverlayError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A required upload field is absent
    #[error("{0}")]
    InputMissing(String),

    /// The uploaded document fails the table's preconditions
    #[error("{0}")]
    InputInvalid(String),

    /// The multipart body could not be read
    #[error("Invalid upload: {0}")]
    Upload(String),

    #[error("{0}")]
    Processing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InputMissing(_) | ApiError::InputInvalid(_) | ApiError::Upload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OverlayError> for ApiError {
    fn from(err: OverlayError) -> Self {
        match err {
            OverlayError::InvalidInput(msg) => ApiError::InputInvalid(msg),
            other => ApiError::Processing(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Processing(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
