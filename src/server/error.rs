//! Error-to-HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use streamforged_common::Error;

/// Wrapper so route handlers can return `Result<T, AppError>` and use `?`
/// on any error that converts into [`streamforged_common::Error`].
#[derive(Debug)]
pub struct AppError(Error);

impl AppError {
    pub fn inner(&self) -> &Error {
        &self.0
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl<E: Into<Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in handler");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        let code = match &self.0 {
            Error::NotFound { .. } => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::Validation(_) => "validation_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::Unavailable(_) => "unavailable",
            Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
