pub mod agent;
pub mod cancel;
pub mod emitter;
pub mod error;
pub mod routes;
pub mod runner;
pub mod signature;
pub mod state;
pub mod tracker;
pub mod workspace;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health::liveness))
        .route("/health", get(routes::health::health))
        .route("/webhook", post(routes::webhook::receive))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the webhook server on `0.0.0.0:<port>`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the webhook server on a pre-bound listener.
///
/// Lets the caller read the actual port first (useful with `port = 0`).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("relay listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
