use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::cloud::CloudError;

/// Handler error rendered as `{"error": "..."}`.
///
/// Anything convertible to `anyhow::Error` becomes a 500; failures of the
/// Green Energy cloud go through [`AppError::upstream`] instead.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl AppError {
    /// `401` for a rejected token, `502` for every other cloud failure.
    pub fn upstream(e: CloudError) -> Self {
        let status = match e {
            CloudError::Authentication(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            error: e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.error.to_string() }));
        (self.status, body).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: e.into(),
        }
    }
}
