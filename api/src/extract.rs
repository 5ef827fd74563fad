//! Custom extractors that convert axum rejections to structured error responses.
//!
//! Use `AppJson<T>` as a drop-in replacement for `axum::Json<T>` in handler
//! signatures. Unlike the standard extractor, deserialization failures
//! produce a JSON `ApiError` body instead of axum's default plain-text 422.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

use agora_core::error::Violation;

use crate::error::AppError;

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured validation error.
fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field = extract_field_from_serde_message(&body_text).unwrap_or_else(|| "body".to_string());

    AppError::validation(vec![
        Violation::new(field, format!("Invalid request body: {body_text}"))
            .with_docs_hint("Check the request body against the endpoint's schema (GET /api-doc/openapi.json)"),
    ])
}

/// Try to extract a field name from serde's error messages:
/// "missing field `score`" → "score", "unknown field `foo`" → "foo".
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    let start = msg.find('`')? + 1;
    let end = msg[start..].find('`')? + start;
    let field = &msg[start..end];
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}
