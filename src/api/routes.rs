//! API Route Configuration

use axum::{
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState, NDJSON_CONTENT_TYPE};
use super::middleware::{api_key_middleware, logging_middleware};

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-plan"),
        ]);

    // gzip would hold feed lines back until a buffer fills
    let compression = CompressionLayer::new()
        .compress_when(DefaultPredicate::new().and(NotForContentType::new(NDJSON_CONTENT_TYPE)));

    // Every call here is charged against the presented key
    let protected = Router::new()
        .route("/simulate", post(handlers::simulate))
        .route("/classify", post(handlers::classify_tx))
        .route("/networks/:network/address/:address", get(handlers::address_info))
        .route("/networks/:network/gas", get(handlers::gas_info))
        .route("/networks/:network/tx/:hash", get(handlers::tx_info))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_middleware));

    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/networks", get(handlers::list_networks))
        .route("/stream/:network", get(handlers::stream_network))
        .route("/stats", get(handlers::get_stats));

    Router::new()
        .nest("/v1", public.merge(protected))
        // Also expose at root for convenience
        .route("/health", get(handlers::health_check))
        .fallback(handlers::not_found)
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(compression)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
}
