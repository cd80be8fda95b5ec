//! JSON error bodies for the HTTP API

use crate::error::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error body: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
    #[serde(skip)]
    status: StatusCode,
}

/// API error detail
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
            status,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// HTTP status this error is sent with
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::PermissionDenied(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Error::InvalidTaxonomyValue(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_FOLDER"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Error::RemoteUnavailable(_) | Error::UnparsableResponse(_) => {
                (StatusCode::BAD_GATEWAY, "REMOTE_UNAVAILABLE")
            }
            Error::Decryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DECRYPTION_FAILED"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
