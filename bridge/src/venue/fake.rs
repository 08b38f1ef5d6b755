//! Scripted venue port used by engine, dispatch and API tests. Every call is
//! recorded so tests can assert on exact order flow.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use super::{
    CancelOutcome, OpenOrder, OrderFill, PerpState, PositionSnapshot, Side, SpotBalance,
    SymbolMeta, Tif, TriggerKind, UserRole, VenueError, VenuePort, VenuePortResult, VenueResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Read(String),
    MarketOpen {
        symbol: String,
        side: Side,
        size: Decimal,
        reduce_only: bool,
    },
    MarketClose {
        symbol: String,
    },
    LimitOrder {
        symbol: String,
        side: Side,
        size: Decimal,
        px: Decimal,
        tif: Tif,
    },
    TriggerOrder {
        symbol: String,
        side: Side,
        size: Decimal,
        trigger_px: Decimal,
        is_market: bool,
        kind: TriggerKind,
    },
    CancelOrder {
        symbol: String,
        oid: u64,
    },
}

impl RecordedCall {
    fn label(&self) -> &str {
        match self {
            Self::Read(name) => name,
            Self::MarketOpen { .. } => "market_open",
            Self::MarketClose { .. } => "market_close",
            Self::LimitOrder { .. } => "limit_order",
            Self::TriggerOrder { .. } => "trigger_order",
            Self::CancelOrder { .. } => "cancel_order",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Read(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Ok,
    Null,
    Rejected,
    TransportError,
}

struct FakeState {
    user_role: UserRole,
    account_value: Decimal,
    spot_usdc: Decimal,
    positions: Vec<PositionSnapshot>,
    meta: HashMap<String, SymbolMeta>,
    open_orders: Vec<OpenOrder>,
    fills: Vec<OrderFill>,
    close_behavior: CloseBehavior,
    fill_px: Decimal,
    reject_entry: bool,
    reject_reduce_only_open: bool,
    reject_triggers: bool,
    reject_cancels: bool,
    calls: Vec<RecordedCall>,
    next_oid: u64,
}

pub struct FakeVenue {
    state: Mutex<FakeState>,
}

impl FakeVenue {
    pub fn new() -> Self {
        let mut meta = HashMap::new();
        meta.insert("SOL".to_string(), SymbolMeta { sz_decimals: 2, px_decimals: 2 });
        meta.insert("ETH".to_string(), SymbolMeta { sz_decimals: 4, px_decimals: 2 });
        meta.insert("BTC".to_string(), SymbolMeta { sz_decimals: 5, px_decimals: 1 });

        Self {
            state: Mutex::new(FakeState {
                user_role: UserRole::Master,
                account_value: dec!(1000),
                spot_usdc: Decimal::ZERO,
                positions: Vec::new(),
                meta,
                open_orders: Vec::new(),
                fills: Vec::new(),
                close_behavior: CloseBehavior::Ok,
                fill_px: dec!(175),
                reject_entry: false,
                reject_reduce_only_open: false,
                reject_triggers: false,
                reject_cancels: false,
                calls: Vec::new(),
                next_oid: 1000,
            }),
        }
    }

    pub async fn set_user_role(&self, role: UserRole) {
        self.state.lock().await.user_role = role;
    }

    pub async fn set_account_value(&self, value: Decimal) {
        self.state.lock().await.account_value = value;
    }

    pub async fn set_spot_usdc(&self, value: Decimal) {
        self.state.lock().await.spot_usdc = value;
    }

    pub async fn set_position(&self, symbol: &str, size: Decimal, entry_px: Decimal) {
        self.state.lock().await.positions.push(PositionSnapshot {
            symbol: symbol.to_string(),
            size,
            entry_px: Some(entry_px),
        });
    }

    pub async fn set_close_behavior(&self, behavior: CloseBehavior) {
        self.state.lock().await.close_behavior = behavior;
    }

    pub async fn set_fill_px(&self, px: Decimal) {
        self.state.lock().await.fill_px = px;
    }

    pub async fn set_reject_entry(&self, reject: bool) {
        self.state.lock().await.reject_entry = reject;
    }

    pub async fn set_reject_reduce_only_open(&self, reject: bool) {
        self.state.lock().await.reject_reduce_only_open = reject;
    }

    pub async fn set_reject_triggers(&self, reject: bool) {
        self.state.lock().await.reject_triggers = reject;
    }

    pub async fn set_reject_cancels(&self, reject: bool) {
        self.state.lock().await.reject_cancels = reject;
    }

    pub async fn set_open_orders(&self, orders: Vec<OpenOrder>) {
        self.state.lock().await.open_orders = orders;
    }

    pub async fn set_fills(&self, fills: Vec<OrderFill>) {
        self.state.lock().await.fills = fills;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone()
    }

    /// Only the order-producing calls, in submission order.
    pub async fn mutations(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn count_calls(&self, label: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.label() == label)
            .count()
    }
}

impl Default for FakeVenue {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(message: &str) -> VenueResult {
    VenueResult::Rejected {
        code: "order_rejected".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl VenuePort for FakeVenue {
    async fn user_role(&self, _addr: &str) -> VenuePortResult<UserRole> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Read("user_role".into()));
        Ok(state.user_role.clone())
    }

    async fn clearinghouse_state(&self, _addr: &str) -> VenuePortResult<PerpState> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RecordedCall::Read("clearinghouse_state".into()));
        Ok(PerpState {
            account_value: state.account_value,
            withdrawable: state.account_value,
            positions: state.positions.clone(),
        })
    }

    async fn spot_state(&self, _addr: &str) -> VenuePortResult<Vec<SpotBalance>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Read("spot_state".into()));
        Ok(vec![SpotBalance {
            coin: "USDC".to_string(),
            total: state.spot_usdc,
        }])
    }

    async fn symbol_meta(&self) -> VenuePortResult<HashMap<String, SymbolMeta>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Read("symbol_meta".into()));
        Ok(state.meta.clone())
    }

    async fn market_open(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        reduce_only: bool,
    ) -> VenuePortResult<VenueResult> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::MarketOpen {
            symbol: symbol.to_string(),
            side,
            size,
            reduce_only,
        });
        if reduce_only && state.reject_reduce_only_open {
            return Ok(rejected("reduce only order would increase position"));
        }
        if !reduce_only && state.reject_entry {
            return Ok(rejected("insufficient margin"));
        }
        state.next_oid += 1;
        Ok(VenueResult::Filled {
            order_id: state.next_oid,
            avg_px: state.fill_px,
            size,
        })
    }

    async fn market_close(&self, symbol: &str) -> VenuePortResult<Option<VenueResult>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::MarketClose {
            symbol: symbol.to_string(),
        });
        match state.close_behavior {
            CloseBehavior::Ok => {
                let closed_size = state
                    .positions
                    .iter()
                    .find(|p| p.symbol == symbol)
                    .map(|p| p.size.abs())
                    .unwrap_or(Decimal::ZERO);
                state.next_oid += 1;
                Ok(Some(VenueResult::Filled {
                    order_id: state.next_oid,
                    avg_px: state.fill_px,
                    size: closed_size,
                }))
            }
            CloseBehavior::Null => Ok(None),
            CloseBehavior::Rejected => Ok(Some(rejected("close rejected"))),
            CloseBehavior::TransportError => {
                Err(VenueError::Transport("connection reset".to_string()))
            }
        }
    }

    async fn limit_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        px: Decimal,
        tif: Tif,
    ) -> VenuePortResult<VenueResult> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::LimitOrder {
            symbol: symbol.to_string(),
            side,
            size,
            px,
            tif,
        });
        if state.reject_entry {
            return Ok(rejected("price out of bounds"));
        }
        state.next_oid += 1;
        Ok(VenueResult::Resting {
            order_id: state.next_oid,
        })
    }

    async fn trigger_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        trigger_px: Decimal,
        is_market: bool,
        kind: TriggerKind,
    ) -> VenuePortResult<VenueResult> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::TriggerOrder {
            symbol: symbol.to_string(),
            side,
            size,
            trigger_px,
            is_market,
            kind,
        });
        if state.reject_triggers {
            return Ok(rejected("trigger price invalid"));
        }
        state.next_oid += 1;
        Ok(VenueResult::Resting {
            order_id: state.next_oid,
        })
    }

    async fn cancel_order(&self, symbol: &str, oid: u64) -> VenuePortResult<CancelOutcome> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::CancelOrder {
            symbol: symbol.to_string(),
            oid,
        });
        if state.reject_cancels {
            return Ok(CancelOutcome::Rejected {
                message: "order already filled".to_string(),
            });
        }
        state.open_orders.retain(|o| o.oid != oid);
        Ok(CancelOutcome::Cancelled)
    }

    async fn open_orders(&self, _addr: &str) -> VenuePortResult<Vec<OpenOrder>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Read("open_orders".into()));
        Ok(state.open_orders.clone())
    }

    async fn order_history(&self, _addr: &str) -> VenuePortResult<Vec<OrderFill>> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall::Read("order_history".into()));
        Ok(state.fills.clone())
    }
}
