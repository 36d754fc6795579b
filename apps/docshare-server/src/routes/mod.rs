//! Route modules for DocShare Server

pub mod auth;
pub mod documents;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod users;

use axum::{
    http::{HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::{ActivityRepository, NewActivity};
use crate::rate_limit::RateLimiter;
use crate::state::AppState;
use crate::storage::UPLOADS_URL_PREFIX;

/// Extra room on top of the file size limit for the other multipart fields
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let max_upload = state.files().max_file_size() as usize + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(state.files().root());
    let limits = &state.config().rate_limit;

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth::router())
        .nest(
            "/api/documents",
            documents::router(max_upload, RateLimiter::new(limits.upload)),
        )
        .nest("/api/users", users::router())
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .fallback(route_not_found);

    if let Some(limiter) = RateLimiter::new(limits.general) {
        router = router.layer(from_fn_with_state(limiter, middleware::rate_limit));
    }

    router
        .layer(from_fn(middleware::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config().server.cors_origins))
        .with_state(state)
}

/// Any origin when `origins` is empty, otherwise exactly the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| tracing::warn!("Ignoring invalid CORS origin: {}", origin))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": "Route not found",
        })),
    )
}

/// Append to the activity log; a failed write never fails the request
pub(crate) async fn record_activity(db: &SqlitePool, entry: NewActivity<'_>) {
    if let Err(e) = ActivityRepository::new(db).log(&entry).await {
        tracing::warn!(
            user_id = %entry.user_id,
            activity = entry.activity_type.as_str(),
            "Failed to record activity: {}",
            e
        );
    }
}
