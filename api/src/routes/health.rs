use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use agora_core::store::Collection;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// Liveness and store connectivity check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // A point read against a fixed id exercises the backend without
    // depending on any data being present.
    let store = match state
        .store
        .find_by_id(Collection::Comments, "health-probe")
        .await
    {
        Ok(_) => "ok",
        Err(err) => {
            tracing::warn!(error = %err, "health probe failed against store");
            "unreachable"
        }
    };

    let status = if store == "ok" { "ok" } else { "degraded" };
    Json(HealthResponse { status, store })
}
