//! Per-route rate limiting on top of the core fixed-window limiter.
//!
//! The guard runs before any store access: a rejection short-circuits the
//! request with 429 and a `retry-after` header. Keys compose the route's
//! action tag with the client identifier from `X-Forwarded-For` (first hop
//! only), e.g. `artifacts:comments:post:203.0.113.10`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Duration;

use agora_core::error::CoreError;
use agora_core::rate_limit::{RateDecision, RateLimiter, client_identifier};

use crate::error::AppError;

/// Budget for one action: at most `max` requests per `window_secs` per client.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub action: &'static str,
    pub window_secs: i64,
    pub max: u32,
}

/// POST comments: 20 requests/minute per IP.
pub fn comments_write_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        action: "comments:post",
        window_secs: 60,
        max: 20,
    }
}

/// POST ratings: 30 requests/minute per IP.
pub fn ratings_write_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        action: "ratings:post",
        window_secs: 60,
        max: 30,
    }
}

/// All reads (comments, summaries, inbox): 120 requests/minute per IP.
pub fn read_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        action: "read",
        window_secs: 60,
        max: 120,
    }
}

/// Middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State((limiter, policy)): State<(Arc<RateLimiter>, RateLimitPolicy)>,
    req: Request,
    next: Next,
) -> Response {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let client = client_identifier(forwarded);
    let key = format!("{}:{client}", policy.action);

    match limiter.check(&key, Duration::seconds(policy.window_secs), policy.max) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited { retry_after_secs } => {
            tracing::debug!(key = %key, retry_after_secs, "request rate limited");
            AppError(CoreError::RateLimited { retry_after_secs }).into_response()
        }
    }
}
