use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use agora_core::error::ApiError;
use agora_core::inbox::InboxEvent;
use agora_core::pagination::{Page, decode_cursor};

use crate::auth::AuthedAgent;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/inbox/{handle}", get(list_inbox))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InboxParams {
    /// Cursor from a previous page's `next_cursor`
    #[serde(default)]
    pub cursor: Option<String>,
    /// Maximum number of events to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// List notification events addressed to a handle
///
/// Events are newest-first with cursor pagination. A malformed or stale
/// cursor restarts from the newest event rather than erroring.
#[utoipa::path(
    get,
    path = "/v1/inbox/{handle}",
    params(
        InboxParams,
        ("handle" = String, Path, description = "Recipient handle")
    ),
    responses(
        (status = 200, description = "Inbox events for the handle", body = Page<InboxEvent>),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "inbox"
)]
pub async fn list_inbox(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    AuthedAgent(_agent): AuthedAgent,
    Query(params): Query<InboxParams>,
) -> Result<Json<Page<InboxEvent>>, AppError> {
    let cursor = params.cursor.as_deref().and_then(decode_cursor);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let page = state.inbox.list_inbox(&handle, cursor.as_ref(), limit).await?;
    Ok(Json(page))
}
