use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::error::BridgeError;

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

/// Pass-through read of recent fills; the venue returns them oldest-first, so
/// the tail is the recent window.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.handle().await;
    let fills = handle
        .venue
        .order_history(&handle.account.master_addr)
        .await
        .map_err(|e| ApiError::from(BridgeError::from(e)))?;

    let limit = query.limit.unwrap_or(20);
    let start = fills.len().saturating_sub(limit);
    let recent = &fills[start..];

    Ok(Json(json!({
        "status": "success",
        "wallet_address": handle.account.master_addr,
        "total_orders": recent.len(),
        "orders": recent,
    })))
}

pub async fn open(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let handle = state.handle().await;
    let orders = handle
        .venue
        .open_orders(&handle.account.master_addr)
        .await
        .map_err(|e| ApiError::from(BridgeError::from(e)))?;

    Ok(Json(json!({
        "status": "success",
        "wallet_address": handle.account.master_addr,
        "total_orders": orders.len(),
        "orders": orders,
    })))
}
