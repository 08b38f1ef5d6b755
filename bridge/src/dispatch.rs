use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::clock;
use crate::engine::{CallOutcome, ExecutionEngine, ExecutionReport, VenueCall};
use crate::error::BridgeError;
use crate::journal::{JournalEntry, LogLevel, ResponseRecord, WebhookRecord};
use crate::signal::Signal;
use crate::strategy::DEFAULT_STRATEGY_ID;
use crate::venue::{CancelOutcome, VenueResult};

#[derive(Debug)]
pub enum DispatchStatus {
    Executed(ExecutionReport),
    /// Strategy disabled: acknowledged with an explanatory body, no venue I/O.
    Skipped,
}

#[derive(Debug)]
pub struct Dispatched {
    pub webhook_id: Uuid,
    pub strategy_id: String,
    pub status: DispatchStatus,
}

/// Ingress facade: validate the payload, resolve the strategy, journal the
/// receipt, then run the execution engine under the symbol lock and journal
/// one `VenueResponse` per venue call, in causal order. Strategy counters are
/// not touched here: the engine settles them while the lock is held.
pub async fn process(state: &AppState, payload: Value, source: &str) -> Result<Dispatched, BridgeError> {
    let webhook_id = Uuid::new_v4();

    let signal = match Signal::from_payload(&payload) {
        Ok(signal) => signal,
        Err(e) => {
            record_invalid(state, webhook_id, &payload, source, &e).await;
            return Err(e);
        }
    };

    let strategy_id = signal
        .strategy_id
        .clone()
        .unwrap_or_else(|| DEFAULT_STRATEGY_ID.to_string());
    if state.registry.ensure(&strategy_id).await {
        state
            .journal
            .log(
                LogLevel::Info,
                format!("new strategy discovered automatically: {strategy_id}"),
                None,
            )
            .await;
    }

    state
        .journal
        .append(JournalEntry::WebhookReceived(WebhookRecord {
            id: webhook_id,
            timestamp: clock::now_iso(),
            source: source.to_string(),
            payload: payload.clone(),
            status: "received".to_string(),
            error: None,
            strategy_id: strategy_id.clone(),
        }))
        .await
        .map_err(|e| BridgeError::Connectivity(format!("journal write failed: {e}")))?;

    let handle = state.handle().await;
    let _guard = match state.locks.acquire(&signal.symbol).await {
        Ok(guard) => guard,
        Err(e) => {
            state
                .journal
                .log(
                    LogLevel::Error,
                    format!("symbol {} busy, signal {webhook_id} not executed", signal.symbol),
                    None,
                )
                .await;
            return Err(e);
        }
    };

    let engine = ExecutionEngine::new(
        handle.venue.clone(),
        state.registry.clone(),
        handle.meta.clone(),
    );
    let result = engine
        .execute(&signal, &strategy_id, &handle.account.master_addr)
        .await;

    match result {
        Ok(report) => {
            journal_report(state, webhook_id, &strategy_id, handle.environment.as_str(), &report)
                .await;
            state
                .journal
                .log(
                    LogLevel::Info,
                    format!(
                        "signal {webhook_id} finished {} with {} venue calls",
                        report.terminal.as_str(),
                        report.calls.len()
                    ),
                    None,
                )
                .await;
            Ok(Dispatched {
                webhook_id,
                strategy_id,
                status: DispatchStatus::Executed(report),
            })
        }
        Err(BridgeError::StrategyDisabled(id)) => {
            state
                .journal
                .log(
                    LogLevel::Warning,
                    format!("strategy {id} is disabled, skipping execution"),
                    Some(json!({"webhook_id": webhook_id, "kind": "strategy_disabled"})),
                )
                .await;
            Ok(Dispatched {
                webhook_id,
                strategy_id,
                status: DispatchStatus::Skipped,
            })
        }
        Err(e) => {
            state
                .journal
                .log(
                    LogLevel::Error,
                    format!("signal {webhook_id} failed: {e}"),
                    Some(json!({"kind": e.kind()})),
                )
                .await;
            Err(e)
        }
    }
}

/// A payload that fails validation never reaches the engine, so it leaves the
/// strategy counters untouched; only the journal records it.
async fn record_invalid(
    state: &AppState,
    webhook_id: Uuid,
    payload: &Value,
    source: &str,
    error: &BridgeError,
) {
    let strategy_id = payload
        .get("strategy_id")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_STRATEGY_ID)
        .to_string();

    state
        .journal
        .log(
            LogLevel::Error,
            format!("webhook validation failed: {error}"),
            Some(json!({"webhook_id": webhook_id})),
        )
        .await;
    if let Err(e) = state
        .journal
        .append(JournalEntry::WebhookReceived(WebhookRecord {
            id: webhook_id,
            timestamp: clock::now_iso(),
            source: source.to_string(),
            payload: payload.clone(),
            status: "failed".to_string(),
            error: Some(error.to_string()),
            strategy_id,
        }))
        .await
    {
        tracing::warn!(error = %e, "invalid_webhook_journal_failed");
    }
}

/// One `VenueResponse` record per venue call, success or failure, appended in
/// the order the calls were submitted.
async fn journal_report(
    state: &AppState,
    webhook_id: Uuid,
    strategy_id: &str,
    environment: &str,
    report: &ExecutionReport,
) {
    for call in &report.calls {
        let entry = response_record(webhook_id, strategy_id, environment, &report.symbol, call);
        if let Err(e) = state.journal.append(JournalEntry::VenueResponse(entry)).await {
            tracing::warn!(error = %e, "venue_response_journal_failed");
        }
    }
}

fn response_record(
    webhook_id: Uuid,
    strategy_id: &str,
    environment: &str,
    symbol: &str,
    call: &VenueCall,
) -> ResponseRecord {
    let error = match &call.outcome {
        CallOutcome::Order(VenueResult::Rejected { message, .. }) => Some(message.clone()),
        CallOutcome::NullResponse => Some("venue returned a null close response".to_string()),
        CallOutcome::Cancel(CancelOutcome::Rejected { message }) => Some(message.clone()),
        _ => None,
    };
    let response_data = json!({
        "operation": call.kind.label(),
        "symbol": symbol,
        "environment": environment,
        "outcome": serde_json::to_value(&call.outcome).unwrap_or(Value::Null),
    });
    ResponseRecord {
        id: Uuid::new_v4(),
        timestamp: clock::now_iso(),
        webhook_id,
        order_kind: call.kind.label(),
        response_data,
        status: if call.outcome.is_ok() { "success" } else { "error" }.to_string(),
        error,
        strategy_id: strategy_id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
