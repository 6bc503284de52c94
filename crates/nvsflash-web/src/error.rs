//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nvsflash_core::{ManifestError, NvsError};
use serde_json::json;
use thiserror::Error;

use crate::settings::SettingsError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Generator input rejected.
    #[error(transparent)]
    Nvs(#[from] NvsError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Nvs(e) => {
                tracing::debug!("Rejected generator input: {}", e);
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Manifest(e) => {
                tracing::warn!("Manifest error: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server error: {msg}"),
                )
            }
            ApiError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server error: {e}"),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
