use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::BridgeError;
use crate::precision;
use crate::signal::{EntryKind, Signal, TpLevel, MAX_TP_LEVELS};
use crate::strategy::{StatEvent, StrategyRegistry};
use crate::venue::{
    CancelOutcome, MetaCache, PositionSnapshot, Side, SymbolMeta, Tif, TriggerKind, VenueError,
    VenuePort, VenuePortResult, VenueResult,
};

/// Share of the entry handed to an intermediate TP level that arrives
/// without an explicit size. A size-less final level takes the whole
/// remainder instead, so the ladder closes the position completely.
const DEFAULT_TP_SHARE: Decimal = dec!(0.25);

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Ok,
    Partial,
    Fail,
}

impl Terminal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Fail => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    ClosePosition,
    FlattenFallback,
    CancelOrder { oid: u64 },
    Entry,
    StopLoss,
    TakeProfit { level: u8 },
}

impl OrderKind {
    pub fn label(&self) -> String {
        match self {
            Self::ClosePosition => "close_position".to_string(),
            Self::FlattenFallback => "flatten_fallback".to_string(),
            Self::CancelOrder { .. } => "cancel_order".to_string(),
            Self::Entry => "entry".to_string(),
            Self::StopLoss => "stop_loss".to_string(),
            Self::TakeProfit { level } => format!("take_profit_{level}"),
        }
    }
}

/// What one venue call produced. `NullResponse` is kept distinct from a
/// rejection: the close path's fallback branch depends on observing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Order(VenueResult),
    NullResponse,
    Cancel(CancelOutcome),
}

impl CallOutcome {
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Order(result) => !result.is_rejected(),
            Self::NullResponse => false,
            Self::Cancel(CancelOutcome::Cancelled) => true,
            Self::Cancel(CancelOutcome::Rejected { .. }) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VenueCall {
    pub kind: OrderKind,
    pub outcome: CallOutcome,
}

/// One sub-result per venue call, in submission order, plus the terminal
/// state. The dispatcher journals each call as a `VenueResponse` entry.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub symbol: String,
    pub entry_size: Decimal,
    pub terminal: Terminal,
    pub calls: Vec<VenueCall>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The signal-to-orders state machine: inspect position -> flatten an
/// opposing one (with null-aware fallback) -> enter -> attach protective
/// stop -> attach tiered take-profits. Runs under the caller-held symbol
/// lock; already accepted venue side effects are never rolled back.
pub struct ExecutionEngine {
    venue: Arc<dyn VenuePort>,
    registry: StrategyRegistry,
    meta: Arc<MetaCache>,
}

impl ExecutionEngine {
    pub fn new(venue: Arc<dyn VenuePort>, registry: StrategyRegistry, meta: Arc<MetaCache>) -> Self {
        Self {
            venue,
            registry,
            meta,
        }
    }

    /// Runs one signal and settles the strategy counters. The caller holds
    /// the symbol lock for the whole call, which makes the engine the only
    /// writer of strategy stats and keeps every mutation under the owning
    /// lock. A disabled-strategy skip counts only as a received webhook.
    pub async fn execute(
        &self,
        signal: &Signal,
        strategy_id: &str,
        master: &str,
    ) -> Result<ExecutionReport, BridgeError> {
        self.registry
            .increment(strategy_id, StatEvent::WebhookReceived)
            .await;

        let result = self.run(signal, strategy_id, master).await;
        match &result {
            Ok(report) => {
                let event = match report.terminal {
                    // A partial run still placed the entry; already accepted
                    // side effects count as a forward.
                    Terminal::Ok | Terminal::Partial => StatEvent::ForwardSucceeded,
                    Terminal::Fail => StatEvent::ForwardFailed,
                };
                self.registry.increment(strategy_id, event).await;
            }
            Err(BridgeError::StrategyDisabled(_)) => {}
            Err(_) => {
                self.registry
                    .increment(strategy_id, StatEvent::ForwardFailed)
                    .await;
            }
        }
        result
    }

    async fn run(
        &self,
        signal: &Signal,
        strategy_id: &str,
        master: &str,
    ) -> Result<ExecutionReport, BridgeError> {
        if !self.registry.is_enabled(strategy_id).await {
            return Err(BridgeError::StrategyDisabled(strategy_id.to_string()));
        }

        let meta = self
            .meta
            .get(self.venue.as_ref(), &signal.symbol)
            .await
            .map_err(connectivity)?;

        let mut quantity = signal.quantity;
        if let Some(strategy) = self.registry.get(strategy_id).await {
            if quantity > strategy.rules.max_position_size {
                tracing::warn!(
                    symbol = %signal.symbol,
                    strategy_id,
                    requested = %quantity,
                    limit = %strategy.rules.max_position_size,
                    "quantity_clamped_to_strategy_limit"
                );
                quantity = strategy.rules.max_position_size;
            }
        }

        let entry_size = precision::truncate_size(&meta, quantity);
        if entry_size.is_zero() {
            return Err(BridgeError::InvalidSignal(format!(
                "quantity {quantity} truncates to zero at {} size decimals",
                meta.sz_decimals
            )));
        }

        let mut report = ExecutionReport {
            symbol: signal.symbol.clone(),
            entry_size,
            terminal: Terminal::Ok,
            calls: Vec::new(),
        };

        // Read the current position before deciding anything.
        let perp = self
            .venue
            .clearinghouse_state(master)
            .await
            .map_err(connectivity)?;
        let opposing = perp
            .positions
            .iter()
            .find(|p| p.symbol == signal.symbol && !p.size.is_zero() && opposes(p.size, signal.side))
            .cloned();

        // Reversal: flatten the opposing position before anything else.
        if let Some(position) = opposing {
            tracing::info!(
                symbol = %signal.symbol,
                position_size = %position.size,
                "reversal_flatten_start"
            );
            if !self.flatten(&mut report, &position, &meta).await {
                // Never stack a fresh entry on an unflattened reversal.
                report.terminal = Terminal::Fail;
                return Ok(report);
            }
            self.sweep_orphans(&mut report, &signal.symbol, master).await;
        }

        // Entry order.
        let entry_result = match signal.entry {
            EntryKind::Market => settle(
                self.venue
                    .market_open(&signal.symbol, signal.side, entry_size, false)
                    .await,
            ),
            EntryKind::Limit => {
                // Validated at ingress; a limit signal always carries a price.
                let Some(raw_px) = signal.price else {
                    return Err(BridgeError::InvalidSignal(
                        "limit order requires a positive price".to_string(),
                    ));
                };
                let px = precision::snap_entry_px(&meta, raw_px);
                settle(
                    self.venue
                        .limit_order(&signal.symbol, signal.side, entry_size, px, Tif::Gtc)
                        .await,
                )
            }
        };
        let entry_avg_px = match &entry_result {
            VenueResult::Filled { avg_px, .. } => Some(*avg_px),
            _ => None,
        };
        let entry_rejected = entry_result.is_rejected();
        report.calls.push(VenueCall {
            kind: OrderKind::Entry,
            outcome: CallOutcome::Order(entry_result),
        });
        if entry_rejected {
            report.terminal = Terminal::Fail;
            return Ok(report);
        }

        // Protective stop. Resting limit entries are allowed to carry
        // pending protective children.
        let mut partial = false;
        if let Some(stop) = signal.stop {
            let trigger_px = precision::snap_stop_px(&meta, stop, signal.side);
            let result = settle(
                self.venue
                    .trigger_order(
                        &signal.symbol,
                        signal.side.opposite(),
                        entry_size,
                        trigger_px,
                        true,
                        TriggerKind::StopLoss,
                    )
                    .await,
            );
            partial |= result.is_rejected();
            report.calls.push(VenueCall {
                kind: OrderKind::StopLoss,
                outcome: CallOutcome::Order(result),
            });
        }

        // Take-profit ladder.
        for (level, size) in allocate_tp_sizes(&meta, entry_size, &signal.take_profits) {
            let target = match level.price {
                Some(px) => Some(px),
                None => derived_tp_price(entry_avg_px, level.size, signal.side),
            };
            let Some(target) = target else {
                partial = true;
                report.calls.push(VenueCall {
                    kind: OrderKind::TakeProfit { level: level.level },
                    outcome: CallOutcome::Order(VenueResult::Rejected {
                        code: "no_trigger_price".to_string(),
                        message: format!(
                            "tp{} has no price and the entry fill price is unavailable",
                            level.level
                        ),
                    }),
                });
                continue;
            };

            let trigger_px = precision::snap_tp_px(&meta, target, signal.side);
            let result = settle(
                self.venue
                    .trigger_order(
                        &signal.symbol,
                        signal.side.opposite(),
                        size,
                        trigger_px,
                        true,
                        TriggerKind::TakeProfit,
                    )
                    .await,
            );
            partial |= result.is_rejected();
            report.calls.push(VenueCall {
                kind: OrderKind::TakeProfit { level: level.level },
                outcome: CallOutcome::Order(result),
            });
        }

        report.terminal = if partial { Terminal::Partial } else { Terminal::Ok };
        Ok(report)
    }

    /// Flattens an opposing position. Returns true once the account is flat.
    ///
    /// A null/absent close response and an explicit rejection both route to
    /// the fallback: an immediate-execution reduce-only order for the exact
    /// opposing size. The legacy limit-IOC reduce-only shape is deliberately
    /// not used here; it rejects against empty book levels.
    async fn flatten(
        &self,
        report: &mut ExecutionReport,
        position: &PositionSnapshot,
        meta: &SymbolMeta,
    ) -> bool {
        let need_fallback = match self.venue.market_close(&position.symbol).await {
            Ok(Some(result)) => {
                let rejected = result.is_rejected();
                report.calls.push(VenueCall {
                    kind: OrderKind::ClosePosition,
                    outcome: CallOutcome::Order(result),
                });
                rejected
            }
            Ok(None) => {
                tracing::warn!(symbol = %position.symbol, "market_close_null_response");
                report.calls.push(VenueCall {
                    kind: OrderKind::ClosePosition,
                    outcome: CallOutcome::NullResponse,
                });
                true
            }
            Err(e) => {
                report.calls.push(VenueCall {
                    kind: OrderKind::ClosePosition,
                    outcome: CallOutcome::Order(VenueResult::Rejected {
                        code: "connectivity".to_string(),
                        message: e.to_string(),
                    }),
                });
                true
            }
        };

        if !need_fallback {
            return true;
        }

        let flatten_side = if position.size > Decimal::ZERO {
            Side::Sell
        } else {
            Side::Buy
        };
        let flatten_size = precision::truncate_size(meta, position.size.abs());
        let result = settle(
            self.venue
                .market_open(&position.symbol, flatten_side, flatten_size, true)
                .await,
        );
        let ok = !result.is_rejected();
        report.calls.push(VenueCall {
            kind: OrderKind::FlattenFallback,
            outcome: CallOutcome::Order(result),
        });
        ok
    }

    /// Cancels orders left behind by the flattened position (stale stops and
    /// take-profits). Failures are recorded but never abort the sequence.
    async fn sweep_orphans(&self, report: &mut ExecutionReport, symbol: &str, master: &str) {
        let orders = match self.venue.open_orders(master).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "orphan_sweep_read_failed");
                return;
            }
        };

        for order in orders.iter().filter(|o| o.coin == symbol) {
            let outcome = match self.venue.cancel_order(symbol, order.oid).await {
                Ok(outcome) => outcome,
                Err(e) => CancelOutcome::Rejected {
                    message: e.to_string(),
                },
            };
            report.calls.push(VenueCall {
                kind: OrderKind::CancelOrder { oid: order.oid },
                outcome: CallOutcome::Cancel(outcome),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connectivity(e: VenueError) -> BridgeError {
    BridgeError::Connectivity(e.to_string())
}

/// Venue timeouts and transport failures on write paths are treated as
/// rejections; an implicit retry could duplicate a live order.
fn settle(raw: VenuePortResult<VenueResult>) -> VenueResult {
    match raw {
        Ok(result) => result,
        Err(e) => VenueResult::Rejected {
            code: "connectivity".to_string(),
            message: e.to_string(),
        },
    }
}

fn opposes(position_size: Decimal, side: Side) -> bool {
    match side {
        Side::Buy => position_size < Decimal::ZERO,
        Side::Sell => position_size > Decimal::ZERO,
    }
}

/// Sizes the TP ladder against a running budget that starts at the entry
/// size. Levels run in order 1..4: explicit sizes are truncated then clamped
/// to what is left, size-less levels take the default share. A size-less
/// final level instead takes everything still unassigned, so the ladder ends
/// in a complete exit. Sequential clamping truncates any excess off the
/// highest-numbered level first; levels that clamp to zero are skipped.
fn allocate_tp_sizes(
    meta: &SymbolMeta,
    entry_size: Decimal,
    levels: &[TpLevel],
) -> Vec<(TpLevel, Decimal)> {
    let default_share = precision::truncate_size(meta, entry_size * DEFAULT_TP_SHARE);
    let mut remaining = entry_size;
    let mut allocations = Vec::new();

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        let desired = match level.size {
            Some(size) => precision::truncate_size(meta, size),
            None if level.level == MAX_TP_LEVELS => remaining,
            None => default_share,
        };
        let size = desired.min(remaining);
        if size <= Decimal::ZERO {
            continue;
        }
        remaining -= size;
        allocations.push((level.clone(), size));
    }
    allocations
}

/// Legacy dual use of `tpN_perc`: when a level has no price, the same field
/// acts as a percentage offset from the entry fill price.
fn derived_tp_price(entry_avg_px: Option<Decimal>, perc: Option<Decimal>, side: Side) -> Option<Decimal> {
    let avg_px = entry_avg_px?;
    let perc = perc?;
    let offset = avg_px * perc / dec!(100);
    Some(match side {
        Side::Buy => avg_px + offset,
        Side::Sell => avg_px - offset,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
