pub mod error;
pub mod handlers;
pub mod state;


use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/webhook/tradingview", post(handlers::webhook::tradingview))
        .route("/webhook/re-execute", post(handlers::webhook::re_execute))
        .route("/status", get(handlers::status::status))
        .route(
            "/logs",
            get(handlers::journal::logs).delete(handlers::journal::clear_logs),
        )
        .route("/webhooks", get(handlers::journal::webhooks))
        .route("/responses", get(handlers::journal::responses))
        .route("/strategies", get(handlers::strategies::list))
        .route("/strategies/ids", get(handlers::strategies::ids))
        .route("/strategies/{id}", get(handlers::strategies::get_one))
        .route("/strategies/{id}/toggle", post(handlers::strategies::toggle))
        .route(
            "/environment",
            get(handlers::environment::get_environment).post(handlers::environment::switch),
        )
        .route("/restart", post(handlers::status::restart))
        .route("/reset-uptime-stats", post(handlers::status::reset_uptime))
        .route("/orders/history", get(handlers::orders::history))
        .route("/orders/open", get(handlers::orders::open))
        .with_state(state);

    // The operator panel is served from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new().nest("/api", api).layer(cors)
}

pub async fn serve(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "api_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown_signal_received");
        }
        _ = state.restart.notified() => {
            tracing::info!("restart_requested_shutting_down");
        }
    }
}
