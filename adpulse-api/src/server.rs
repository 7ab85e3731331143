use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::env;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use adpulse_core::AppContext;

use crate::auth;
use crate::handlers;
use crate::metrics;

pub async fn run(ctx: AppContext) -> Result<()> {
    let api_port = ctx.config.server.api_port;
    let host = ctx.config.server.host.clone();
    let ctx_clone = ctx.clone();

    // Configure CORS - allow specific origins or all if CORS_ORIGINS not set
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/auth/token", post(handlers::generate_token))
        .route("/api/v1/connections/dropi", put(handlers::upsert_dropi_connection))
        .route("/api/v1/connections/lucidbot", put(handlers::upsert_lucidbot_connection))
        .route("/api/v1/sync", post(handlers::trigger_sync))
        .route("/api/v1/sync/all", post(handlers::trigger_sync_all))
        .route("/api/v1/sync/status", get(handlers::sync_status))
        .route("/api/v1/data/clear", post(handlers::clear_data))
        .route("/api/v1/orders", get(handlers::list_orders))
        .route("/api/v1/wallet/movements", get(handlers::list_movements))
        .route("/api/v1/contacts", get(handlers::list_contacts))
        .route("/api/v1/metrics/ads", get(metrics::ad_metrics))
        .route("/api/v1/metrics/summary", get(metrics::summary_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(ctx_clone))
                .layer(middleware::from_fn(auth::auth_middleware))
                .layer(cors_layer),
        );

    let addr: SocketAddr = format!("{}:{}", host, api_port).parse()?;
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
