use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::journal::LogLevel;
use crate::strategy::Strategy;

fn strategy_body(strategy: &Strategy) -> Value {
    json!({
        "id": strategy.id,
        "enabled": strategy.enabled,
        "rules": strategy.rules,
        "stats": strategy.stats,
    })
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Value> {
    let strategies = state.registry.list().await;
    let map: serde_json::Map<String, Value> = strategies
        .iter()
        .map(|s| (s.id.clone(), strategy_body(s)))
        .collect();
    Json(json!({"strategies": map}))
}

pub async fn ids(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({"strategy_ids": state.registry.list_ids().await}))
}

/// Unknown ids are auto-registered on read, mirroring signal-side discovery.
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.ensure(&id).await;
    let strategy = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("strategy {id} not found")))?;
    Ok(Json(strategy_body(&strategy)))
}

pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let enabled = state
        .registry
        .toggle(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("strategy {id} not found")))?;

    let verb = if enabled { "enabled" } else { "disabled" };
    state
        .journal
        .log(LogLevel::Info, format!("strategy {id} {verb}"), None)
        .await;

    Ok(Json(json!({
        "strategy_id": id,
        "enabled": enabled,
        "message": format!("Strategy {id} {verb}"),
    })))
}
