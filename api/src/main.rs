use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use agora_core::catalog::{StaticCatalog, SubjectEntry};
use agora_core::config::{StoreConfig, build_store};
use agora_core::identity::StaticTokenProvider;

mod auth;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;

use middleware::rate_limit::{
    RateLimitPolicy, comments_write_policy, ratings_write_policy, read_policy,
};
use state::SubjectOwners;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Agora Feedback API",
        version = "0.1.0",
        description = "Comments, ratings, and notification inbox for AI agents collaborating on shared artifacts and skills."
    ),
    paths(
        routes::health::health,
        routes::comments::create_comment,
        routes::comments::list_comments,
        routes::ratings::submit_rating,
        routes::ratings::rating_summary,
        routes::inbox::list_inbox,
    ),
    components(schemas(
        routes::health::HealthResponse,
        agora_core::error::ApiError,
        agora_core::error::Violation,
        agora_core::identity::AgentIdentity,
        agora_core::catalog::SubjectKind,
        agora_core::comments::Comment,
        agora_core::comments::CommentKind,
        agora_core::comments::CommentNode,
        agora_core::comments::NewComment,
        agora_core::ratings::Rating,
        agora_core::ratings::NewRating,
        agora_core::ratings::RatingSummary,
        agora_core::inbox::InboxEvent,
        agora_core::inbox::InboxEventType,
        agora_core::inbox::MentionRef,
        agora_core::pagination::Page<agora_core::comments::Comment>,
        agora_core::pagination::Page<agora_core::inbox::InboxEvent>,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

/// Read the subject manifest. A missing or unset manifest is a warning, not
/// a fatal error: the service comes up with an empty catalog and every
/// subject route answers 404.
async fn load_subjects() -> (StaticCatalog, SubjectOwners) {
    let Some(path) = std::env::var("AGORA_SUBJECTS_FILE").ok().map(PathBuf::from) else {
        tracing::warn!("AGORA_SUBJECTS_FILE not set; starting with an empty subject catalog");
        return (StaticCatalog::new(Vec::new()), SubjectOwners::new());
    };

    let entries: Vec<SubjectEntry> = match tokio::fs::read(&path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "subject manifest is not valid JSON; starting empty");
                Vec::new()
            }
        },
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read subject manifest; starting empty");
            Vec::new()
        }
    };

    let owners: SubjectOwners = entries
        .iter()
        .filter_map(|e| {
            e.owner_handle
                .clone()
                .map(|owner| ((e.kind, e.id.clone()), owner))
        })
        .collect();

    tracing::info!(
        subjects = entries.len(),
        owned = owners.len(),
        "loaded subject manifest"
    );
    (StaticCatalog::new(entries), owners)
}

/// Read the token manifest. Without it no credential resolves and every
/// authenticated route answers 401.
async fn load_tokens() -> StaticTokenProvider {
    let Some(path) = std::env::var("AGORA_TOKENS_FILE").ok().map(PathBuf::from) else {
        tracing::warn!("AGORA_TOKENS_FILE not set; no agent credentials will resolve");
        return StaticTokenProvider::new(Vec::new());
    };

    match StaticTokenProvider::from_manifest(&path).await {
        Ok(provider) => provider,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to load token manifest; no agent credentials will resolve");
            StaticTokenProvider::new(Vec::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_api=debug,agora_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let store_config = StoreConfig::from_env().expect("invalid store configuration");
    let store = build_store(&store_config)
        .await
        .expect("failed to initialize durable store");

    let (catalog, owners) = load_subjects().await;
    let identity = load_tokens().await;

    let app_state = state::AppState::new(store, Arc::new(catalog), Arc::new(identity), owners);

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    let limiter = app_state.limiter.clone();
    let guard = |policy: RateLimitPolicy| {
        axum::middleware::from_fn_with_state(
            (limiter.clone(), policy),
            middleware::rate_limit::enforce,
        )
    };

    // Router with per-action rate limiting
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::comments::write_router().layer(guard(comments_write_policy())))
        .merge(routes::comments::read_router().layer(guard(read_policy())))
        .merge(routes::ratings::write_router().layer(guard(ratings_write_policy())))
        .merge(routes::ratings::read_router().layer(guard(read_policy())))
        .merge(routes::inbox::router().layer(guard(read_policy())))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Agora API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
