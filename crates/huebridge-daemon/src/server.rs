//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Hue API and UPnP descriptor routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/{user_id}", get(api::list_lights))
        .route("/api/{user_id}/lights/{light_id}", get(api::get_light))
        .route(
            "/api/{user_id}/lights/{light_id}/state",
            put(api::set_light_state),
        )
        .route("/upnp/setup.xml", get(api::upnp_setup))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the Hue API until `shutdown` resolves
pub async fn run(
    state: Arc<AppState>,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting Hue API server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
