use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::access::{AccessResolver, CatalogStore};
use crate::config::SecurityConfig;
use crate::middleware::{jwt_auth_middleware, AuthKeys};

pub mod protected;

/// Bounds applied to listing requests before they reach the store.
#[derive(Debug, Clone, Copy)]
pub struct ListingLimits {
    pub max_course_ids: usize,
    pub max_items_per_page: u32,
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<AccessResolver>,
    pub catalog: Arc<dyn CatalogStore>,
    pub auth: AuthKeys,
    pub limits: ListingLimits,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Protected (bearer token required)
        .merge(protected_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{access, files};

    Router::new()
        .route("/api/access/check", post(access::check))
        .route("/api/files", get(files::list))
        .route("/api/files/:course_id", get(files::list_for_course))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}

/// CORS layer from security settings; disabled means no CORS headers at all.
pub fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Bucket Access API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "access": "/api/access/check (protected)",
                "files": "/api/files, /api/files/:course_id (protected)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.catalog.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
