//! Maps `CoreError` onto the public HTTP surface. `NotFound` and a
//! rejected targeting match are intentionally indistinguishable — both
//! arrive here as `CoreError::NotFound`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use linkforty_core::error::CoreError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CoreError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            CoreError::StoreUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable"),
            CoreError::CacheUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_unavailable"),
            CoreError::DuplicateShortCode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "duplicate_short_code"),
            CoreError::Serialization(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        metrics::counter!("api.errors", "kind" => code).increment(1);
        (
            status,
            Json(ErrorBody {
                error: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
