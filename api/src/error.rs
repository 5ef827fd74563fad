use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use agora_core::error::{ApiError, CoreError, Violation, codes};

/// Internal error type that converts core errors to structured API responses.
#[derive(Debug)]
pub struct AppError(pub CoreError);

impl AppError {
    pub fn validation(violations: Vec<Violation>) -> Self {
        Self(CoreError::Validation(violations))
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::now_v7().to_string();

        let (status, retry_after, api_error) = match self.0 {
            CoreError::Validation(violations) => (
                StatusCode::BAD_REQUEST,
                None,
                ApiError {
                    error: codes::VALIDATION_FAILED.to_string(),
                    message: format!("{} validation rule(s) violated", violations.len()),
                    details: Some(violations),
                    retry_after_secs: None,
                    request_id,
                },
            ),
            CoreError::NotFound { what } => (
                StatusCode::NOT_FOUND,
                None,
                ApiError {
                    error: codes::NOT_FOUND.to_string(),
                    message: format!("{what} not found"),
                    details: None,
                    retry_after_secs: None,
                    request_id,
                },
            ),
            CoreError::Conflict { message } => (
                StatusCode::CONFLICT,
                None,
                ApiError {
                    error: codes::CONFLICT.to_string(),
                    message,
                    details: None,
                    retry_after_secs: None,
                    request_id,
                },
            ),
            CoreError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                Some(retry_after_secs),
                ApiError {
                    error: codes::RATE_LIMITED.to_string(),
                    message: format!("Too many requests. Retry after {retry_after_secs} seconds."),
                    details: None,
                    retry_after_secs: Some(retry_after_secs),
                    request_id,
                },
            ),
            CoreError::Storage(detail) => {
                // Detail stays in the log; clients get a generic message with
                // no internal paths.
                tracing::error!(error = %detail, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                    ApiError {
                        error: codes::STORAGE_ERROR.to_string(),
                        message: "An internal storage error occurred".to_string(),
                        details: None,
                        retry_after_secs: None,
                        request_id,
                    },
                )
            }
            CoreError::Auth(reason) => {
                tracing::debug!(reason = %reason, "authentication failed");
                (
                    StatusCode::UNAUTHORIZED,
                    None,
                    ApiError {
                        error: codes::UNAUTHORIZED.to_string(),
                        message: "Authentication failed".to_string(),
                        details: None,
                        retry_after_secs: None,
                        request_id,
                    },
                )
            }
        };

        let mut response = (status, Json(api_error)).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = secs.to_string().parse()
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}
