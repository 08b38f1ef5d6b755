use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::state::{AppState, VenueHandle};
use crate::config::Environment;
use crate::error::BridgeError;
use crate::journal::LogLevel;

pub async fn get_environment(State(state): State<Arc<AppState>>) -> Json<Value> {
    let handle = state.handle().await;
    Json(json!({"environment": handle.environment.as_str()}))
}

#[derive(Deserialize)]
pub struct SwitchQuery {
    environment: String,
}

/// Rebinds the venue client, re-resolves the account, and drops the balance
/// snapshot. The old handle stays live for requests already in flight.
pub async fn switch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SwitchQuery>,
) -> Result<Json<Value>, ApiError> {
    let environment = Environment::parse(&query.environment).ok_or_else(|| {
        ApiError::Validation("Environment must be 'testnet' or 'mainnet'".to_string())
    })?;

    let handle = VenueHandle::connect(&state.config, environment)
        .await
        .map_err(|e| match e {
            BridgeError::Configuration(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        })?;

    *state.venue.write().await = handle;
    state.balance.invalidate().await;
    state
        .journal
        .log(
            LogLevel::Info,
            format!("environment switched to {environment}"),
            None,
        )
        .await;

    Ok(Json(json!({"status": "success", "environment": environment.as_str()})))
}
