use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::dispatch::{self, DispatchStatus, Dispatched};
use crate::engine::Terminal;
use crate::journal::LogLevel;

pub async fn tradingview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let dispatched = dispatch::process(&state, payload, "tradingview").await?;
    Ok(Json(respond(dispatched, "Webhook processed and forwarded to the venue")))
}

/// Re-runs a previously journaled payload as if newly received: a fresh
/// journal trail is produced and the original record is never touched.
pub async fn re_execute(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let payload = body
        .get("payload")
        .cloned()
        .filter(|p| p.is_object())
        .ok_or_else(|| ApiError::Validation("no payload found in webhook data".to_string()))?;

    state
        .journal
        .log(LogLevel::Info, "re-executing webhook payload", Some(payload.clone()))
        .await;

    let dispatched = dispatch::process(&state, payload, "re-execution").await?;
    Ok(Json(respond(dispatched, "Webhook re-executed successfully")))
}

fn respond(dispatched: Dispatched, message: &str) -> Value {
    match dispatched.status {
        DispatchStatus::Executed(report) => json!({
            "status": if report.terminal == Terminal::Fail { "error" } else { "success" },
            "webhook_id": dispatched.webhook_id,
            "strategy_id": dispatched.strategy_id,
            "message": message,
            "execution": report,
        }),
        DispatchStatus::Skipped => json!({
            "status": "skipped",
            "webhook_id": dispatched.webhook_id,
            "strategy_id": dispatched.strategy_id,
            "message": format!("Strategy {} is disabled", dispatched.strategy_id),
        }),
    }
}
