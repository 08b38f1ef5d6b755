use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::clock;
use crate::journal::LogLevel;

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let handle = state.handle().await;

    let (balance, connected) = match state
        .balance
        .get(handle.venue.as_ref(), &handle.account.master_addr)
        .await
    {
        Ok(snapshot) => (snapshot.total.to_f64(), true),
        Err(e) => {
            tracing::warn!(error = %e, "status_balance_unavailable");
            (None, false)
        }
    };

    let totals = state.registry.totals().await;
    let success_rate =
        (totals.successful_forwards as f64 / totals.total_webhooks.max(1) as f64) * 100.0;

    let uptime = state.uptime.snapshot();

    Json(json!({
        "status": "running",
        "environment": handle.environment.as_str(),
        "uptime": format_uptime(clock::now() - state.started_at),
        "balance": balance,
        "wallet_address": handle.account.master_addr,
        "hyperliquid_connected": connected,
        "statistics": {
            "total_webhooks": totals.total_webhooks,
            "successful_forwards": totals.successful_forwards,
            "failed_forwards": totals.failed_forwards,
            "success_rate": format!("{success_rate:.1}%"),
        },
        "uptime_monitoring": {
            "percentage": format!("{:.1}%", uptime.percentage),
            "total_pings": uptime.total_pings,
            "successful_pings": uptime.successful_pings,
            "failed_pings": uptime.failed_pings,
            "monitoring_since": uptime.monitoring_since.unwrap_or_else(|| "Starting...".to_string()),
        },
    }))
}

pub async fn restart(State(state): State<Arc<AppState>>) -> Json<Value> {
    state
        .journal
        .log(LogLevel::Info, "server restart requested via API", None)
        .await;
    state.restart.notify_one();
    Json(json!({"status": "success", "message": "Server restart initiated"}))
}

pub async fn reset_uptime(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.uptime.reset();
    state
        .journal
        .log(LogLevel::Info, "uptime statistics reset", None)
        .await;
    Json(json!({
        "status": "success",
        "message": "Uptime statistics reset successfully",
        "timestamp": clock::now_iso(),
    }))
}

fn format_uptime(elapsed: chrono::Duration) -> String {
    let total_secs = elapsed.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}h {minutes:02}m {seconds:02}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(chrono::Duration::seconds(0)), "00h 00m 00s");
        assert_eq!(format_uptime(chrono::Duration::seconds(3725)), "01h 02m 05s");
        assert_eq!(format_uptime(chrono::Duration::seconds(90061)), "25h 01m 01s");
    }
}
