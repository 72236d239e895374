//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::api::{self, AppState};

/// Build the full axum router.
pub fn build_router(state: AppState) -> Router {
    // CORS for a front end served from another origin during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/features", get(api::get_features))
        .route("/api/strategies", get(api::get_strategies))
        .route("/api/prompt", post(api::post_prompt))
        .route("/api/screen", post(api::post_screen))
        .route("/api/compose", post(api::post_compose))
        .route("/api/validate", post(api::post_validate))
        .route("/api/followup", post(api::post_followup))
        .route("/api/interact", post(api::post_interact))
        .route(
            "/api/children/{child_id}/whitelist",
            put(api::put_whitelist),
        )
        .route("/api/audit/{user_id}", get(api::get_audit))
        .with_state(state)
        .layer(cors)
}

/// Bind `bind_addr` and serve `router` on a background task.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Web server stopped: {e}");
        }
    });

    Ok(addr)
}
