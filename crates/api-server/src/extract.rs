//! `ValidatedJson` wraps axum's `Json` extractor so a malformed request
//! body surfaces as `CoreError::Validation` — a 400 with a field-level
//! message — instead of axum's bare 415/422.

use crate::error::ApiError;
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use linkforty_core::error::CoreError;
use serde::de::DeserializeOwned;

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => Err(ApiError(CoreError::Validation(describe(rejection)))),
        }
    }
}

fn describe(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("invalid field: {err}"),
        JsonRejection::JsonSyntaxError(err) => format!("malformed JSON: {err}"),
        JsonRejection::MissingJsonContentType(_) => {
            "Content-Type must be application/json".to_string()
        }
        other => other.to_string(),
    }
}
