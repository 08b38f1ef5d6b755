mod account;
mod api;
mod balance;
mod clock;
mod config;
mod dispatch;
mod engine;
mod error;
mod healthcheck;
mod journal;
mod locks;
mod precision;
mod probe;
mod signal;
mod strategy;
mod venue;

use std::sync::Arc;
use std::time::Duration;

use api::state::{AppState, VenueHandle};
use config::Config;
use journal::{Journal, LogLevel};
use strategy::StrategyRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bridge=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    tracing::info!(environment = %cfg.environment, "bridge_starting");

    // Document store
    let mongo = mongodb::Client::with_uri_str(&cfg.mongo_url).await?;
    let db = mongo.database(&cfg.db_name);
    healthcheck::wait_for_store(&db).await?;

    let journal = Journal::mongo(&db);
    let registry = StrategyRegistry::new().with_store(db.collection("strategies"));
    match registry.load_persisted().await {
        Ok(count) if count > 0 => tracing::info!(count, "strategies_loaded_from_store"),
        Ok(_) => tracing::info!("no_persisted_strategies_found"),
        Err(e) => tracing::warn!(error = %e, "strategy_load_failed"),
    }

    // Venue binding for the active environment. An unknown role on the
    // configured key is fatal here.
    let handle = VenueHandle::connect(&cfg, cfg.environment).await.map_err(|e| {
        tracing::error!(error = %e, "venue_binding_failed");
        anyhow::anyhow!("{e}")
    })?;

    // One metadata fetch doubles as the startup connectivity check.
    match handle.venue.symbol_meta().await {
        Ok(meta) => tracing::info!(assets = meta.len(), "venue_connected"),
        Err(e) => tracing::warn!(error = %e, "venue_unreachable_at_startup"),
    }

    journal
        .log(LogLevel::Info, "trading-signal bridge started", None)
        .await;
    journal
        .log(
            LogLevel::Info,
            format!("environment: {}", cfg.environment),
            None,
        )
        .await;
    journal
        .log(
            LogLevel::Info,
            format!("signing as {} for account {}", handle.account.signer_addr, handle.account.master_addr),
            None,
        )
        .await;

    let port = cfg.api_port;
    let state = Arc::new(AppState::new(cfg, handle, journal, registry));

    // Uptime prober runs for the life of the process; failures inside it are
    // logged and swallowed.
    let probe_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;
    tokio::spawn(probe::run(state.uptime.clone(), probe_http));

    api::serve(state.clone(), port).await?;

    state
        .journal
        .log(LogLevel::Info, "server shutting down", None)
        .await;
    tracing::info!("bridge_stopped");
    Ok(())
}
