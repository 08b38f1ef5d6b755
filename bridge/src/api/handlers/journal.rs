use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::journal::LogLevel;

const MAX_LOG_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct LogsQuery {
    limit: Option<usize>,
    level: Option<String>,
}

pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(MAX_LOG_LIMIT);
    let level = match &query.level {
        Some(raw) => Some(
            LogLevel::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown log level: {raw}")))?,
        ),
        None => None,
    };

    let logs = state.journal.recent_logs(limit, level).await?;
    Ok(Json(json!({"logs": logs})))
}

pub async fn clear_logs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let deleted_count = state.journal.clear_logs().await?;
    state
        .journal
        .log(
            LogLevel::Info,
            format!("logs cleared via API - {deleted_count} entries deleted"),
            None,
        )
        .await;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Successfully cleared {deleted_count} logs"),
        "deleted_count": deleted_count,
    })))
}

#[derive(Deserialize)]
pub struct FeedQuery {
    limit: Option<usize>,
    strategy_ids: Option<String>,
}

/// CSV filter semantics: an omitted parameter means unfiltered, while a
/// present-but-empty one is an explicit request for the empty set.
fn parse_strategy_filter(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref().map(|csv| {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

pub async fn webhooks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let filter = parse_strategy_filter(&query.strategy_ids);
    let webhooks = state
        .journal
        .recent_webhooks(limit, filter.as_deref())
        .await?;
    Ok(Json(json!({"webhooks": webhooks})))
}

pub async fn responses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let filter = parse_strategy_filter(&query.strategy_ids);
    let responses = state
        .journal
        .recent_responses(limit, filter.as_deref())
        .await?;
    Ok(Json(json!({"responses": responses})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_filter() {
        assert_eq!(parse_strategy_filter(&None), None);
        assert_eq!(parse_strategy_filter(&Some(String::new())), Some(vec![]));
        assert_eq!(
            parse_strategy_filter(&Some("A, B ,,C".to_string())),
            Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
        );
    }
}
