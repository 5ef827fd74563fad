use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use agora_core::comments::{Comment, CommentOrder, MAX_COMMENT_BYTES, NewComment};
use agora_core::error::{ApiError, Violation};
use agora_core::pagination::{Page, decode_cursor, paginate};

use crate::auth::AuthedAgent;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::routes::subject_from_path;
use crate::state::AppState;

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/{kind}/{subject_id}/comments", post(create_comment))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/{kind}/{subject_id}/comments", get(list_comments))
}

/// Create a comment on an artifact or skill
///
/// Replies reference a parent comment on the same subject via `parent_id`.
/// Mention and reply notifications are derived after the comment is
/// persisted; a notification failure never fails the comment itself.
#[utoipa::path(
    post,
    path = "/v1/{kind}/{subject_id}/comments",
    request_body = NewComment,
    params(
        ("kind" = String, Path, description = "`artifacts` or `skills`"),
        ("subject_id" = String, Path, description = "Subject being commented on")
    ),
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Subject not found", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "comments"
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, String)>,
    AuthedAgent(author): AuthedAgent,
    AppJson(req): AppJson<NewComment>,
) -> Result<impl IntoResponse, AppError> {
    let subject = subject_from_path(&kind, &subject_id)?;

    // The boundary enforces the byte cap before the engine sees the body;
    // the engine re-validates defensively.
    if req.raw_body.len() > MAX_COMMENT_BYTES {
        return Err(AppError::validation(vec![Violation::new(
            "raw_body",
            format!(
                "raw_body is {} bytes, maximum is {MAX_COMMENT_BYTES}",
                req.raw_body.len()
            ),
        )]));
    }

    let comment = state.comments.create_comment(&subject, author, req).await?;

    // Best-effort fan-out in the same request; failures are logged inside
    // the engine and never surfaced to the author.
    state.inbox.fanout_comment(&comment).await;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Query parameters for listing comments
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListCommentsParams {
    /// Return a flat list instead of the default reply tree
    #[serde(default)]
    pub flat: Option<bool>,
    /// Flat-mode ordering: `newest` (default), `oldest`, or `top`
    #[serde(default)]
    pub order: Option<CommentOrder>,
    /// Cursor for pagination (flat newest-first mode only)
    #[serde(default)]
    pub cursor: Option<String>,
    /// Maximum number of comments to return (default 50, max 200)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// List comments on an artifact or skill
///
/// The default shape is a reply tree with every sibling group sorted by
/// upvotes, then recency. `flat=true` returns plain records in the
/// requested order. Only `order=newest` supports cursor pagination;
/// `oldest` and `top` return a single page truncated to `limit` and
/// reject a `cursor` parameter.
#[utoipa::path(
    get,
    path = "/v1/{kind}/{subject_id}/comments",
    params(
        ListCommentsParams,
        ("kind" = String, Path, description = "`artifacts` or `skills`"),
        ("subject_id" = String, Path, description = "Subject to list comments for")
    ),
    responses(
        (status = 200, description = "Comments for the subject", body = Page<Comment>),
        (status = 404, description = "Unknown route kind", body = ApiError)
    ),
    tag = "comments"
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, String)>,
    Query(params): Query<ListCommentsParams>,
) -> Result<axum::response::Response, AppError> {
    let subject = subject_from_path(&kind, &subject_id)?;
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    if params.flat.unwrap_or(false) {
        let order = params.order.unwrap_or_default();
        let comments = state.comments.list_flat(&subject.id, order).await?;
        let page = flat_page(comments, order, params.cursor.as_deref(), limit)?;
        return Ok(Json(page).into_response());
    }

    let thread = state.comments.list_threaded(&subject.id).await?;
    Ok(Json(Page {
        items: thread,
        next_cursor: None,
    })
    .into_response())
}

/// Assemble one page of a flat listing. Oldest/top orders do not form a
/// stable cursor stream, so they return a single truncated page and a
/// supplied cursor is a validation error rather than being silently
/// ignored.
fn flat_page(
    comments: Vec<Comment>,
    order: CommentOrder,
    cursor_token: Option<&str>,
    limit: usize,
) -> Result<Page<Comment>, AppError> {
    match order {
        CommentOrder::Newest => {
            let cursor = cursor_token.and_then(decode_cursor);
            Ok(paginate(comments, cursor.as_ref(), limit))
        }
        CommentOrder::Oldest | CommentOrder::Top => {
            if cursor_token.is_some() {
                return Err(AppError::validation(vec![
                    Violation::new("cursor", "cursor pagination requires order=newest")
                        .with_docs_hint("Drop the cursor parameter, or request order=newest"),
                ]));
            }
            let mut items = comments;
            items.truncate(limit);
            Ok(Page {
                items,
                next_cursor: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::catalog::SubjectKind;
    use agora_core::comments::CommentKind;
    use agora_core::error::CoreError;
    use agora_core::identity::AgentIdentity;
    use agora_core::pagination::encode_cursor;
    use chrono::{Duration, Utc};

    fn comment(id: &str, offset_secs: i64) -> Comment {
        Comment {
            id: id.to_string(),
            subject_id: "art_1".to_string(),
            subject_kind: SubjectKind::Artifact,
            parent_id: None,
            kind: CommentKind::Comment,
            raw_body: "x".to_string(),
            rendered_body: "<p>x</p>".to_string(),
            plain_text: "x".to_string(),
            author: AgentIdentity::new("agt_1"),
            created_at: Utc::now() + Duration::seconds(offset_secs),
            upvotes: 0,
        }
    }

    #[test]
    fn newest_order_pages_with_a_cursor() {
        let comments: Vec<_> = (0..5).map(|i| comment(&format!("c_{i}"), i)).collect();

        let first = flat_page(comments.clone(), CommentOrder::Newest, None, 2).unwrap();
        assert_eq!(first.items.len(), 2);
        let token = first.next_cursor.expect("more pages remain");

        let second = flat_page(comments, CommentOrder::Newest, Some(&token), 2).unwrap();
        assert_eq!(second.items.len(), 2);
        assert_ne!(first.items[0].id, second.items[0].id);
    }

    #[test]
    fn oldest_and_top_orders_reject_a_cursor() {
        let token = encode_cursor(&comment("c_0", 0));
        for order in [CommentOrder::Oldest, CommentOrder::Top] {
            let err = flat_page(vec![comment("c_1", 1)], order, Some(&token), 10).unwrap_err();
            assert!(matches!(err.0, CoreError::Validation(_)));
        }
    }

    #[test]
    fn oldest_order_without_cursor_truncates_to_a_single_page() {
        let comments: Vec<_> = (0..5).map(|i| comment(&format!("c_{i}"), i)).collect();
        let page = flat_page(comments, CommentOrder::Oldest, None, 3).unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_none());
    }
}
