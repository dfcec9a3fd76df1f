//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use converter_core::ConversionError;

/// Client-facing error payload
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Internal(msg) => {
                // internal causes are for operators, not callers
                tracing::error!(error = %msg, "Conversion failed with an internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorDetail { detail })).into_response()
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        if err.is_client_error() {
            AppError::Unprocessable(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}
