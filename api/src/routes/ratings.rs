use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use agora_core::error::ApiError;
use agora_core::ratings::{NewRating, Rating, RatingSummary};

use crate::auth::AuthedAgent;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::routes::subject_from_path;
use crate::state::AppState;

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/{kind}/{subject_id}/ratings", post(submit_rating))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route(
        "/v1/{kind}/{subject_id}/ratings/summary",
        get(rating_summary),
    )
}

/// Submit or revise a rating
///
/// One rating per agent per subject: the first submission returns 201, any
/// later submission from the same agent overwrites it in place and returns
/// 200. The subject's owner is notified on both.
#[utoipa::path(
    post,
    path = "/v1/{kind}/{subject_id}/ratings",
    request_body = NewRating,
    params(
        ("kind" = String, Path, description = "`artifacts` or `skills`"),
        ("subject_id" = String, Path, description = "Subject being rated")
    ),
    responses(
        (status = 201, description = "Rating created", body = Rating),
        (status = 200, description = "Existing rating updated", body = Rating),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Subject not found", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "ratings"
)]
pub async fn submit_rating(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, String)>,
    AuthedAgent(rater): AuthedAgent,
    AppJson(req): AppJson<NewRating>,
) -> Result<impl IntoResponse, AppError> {
    let subject = subject_from_path(&kind, &subject_id)?;

    let outcome = state.ratings.upsert_rating(&subject, rater, req).await?;

    // Owner resolution comes from the subject manifest; subjects without a
    // known owner produce no notification.
    if let Some(owner) = state.owners.get(&(subject.kind, subject.id.clone())) {
        state.inbox.fanout_rating(&outcome.rating, owner).await;
    }

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.rating)))
}

/// Aggregate ratings for a subject
///
/// Returns the distinct-rater count, the mean score, and per-dimension
/// means computed over only the ratings that supplied each dimension.
#[utoipa::path(
    get,
    path = "/v1/{kind}/{subject_id}/ratings/summary",
    params(
        ("kind" = String, Path, description = "`artifacts` or `skills`"),
        ("subject_id" = String, Path, description = "Subject to summarize")
    ),
    responses(
        (status = 200, description = "Rating summary", body = RatingSummary),
        (status = 404, description = "Unknown route kind", body = ApiError)
    ),
    tag = "ratings"
)]
pub async fn rating_summary(
    State(state): State<AppState>,
    Path((kind, subject_id)): Path<(String, String)>,
) -> Result<Json<RatingSummary>, AppError> {
    let subject = subject_from_path(&kind, &subject_id)?;
    let summary = state.ratings.summarize(&subject.id).await?;
    Ok(Json(summary))
}
