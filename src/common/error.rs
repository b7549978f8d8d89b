use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that escape the CAS wire-format boundary unconverted.
///
/// The protocol endpoints (`/validate`, `/serviceValidate`, `/proxyValidate`, `/proxy`) never let
/// this type reach the client directly: they catch it and degrade to `INTERNAL_ERROR` on the
/// appropriate wire format. It exists for the handful of admin/service-registry routes and for
/// startup-time failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl ApiError {
    /// Detects a primary-key collision on a generated ticket id, the one `Database` failure the
    /// Ticket Factory is expected to retry rather than surface (SPEC_FULL.md §4.2).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ApiError::Database(message) => {
                message.contains("duplicate key") || message.contains("unique constraint")
            }
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
