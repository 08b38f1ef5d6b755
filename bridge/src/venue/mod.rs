pub mod hyperliquid;

#[cfg(test)]
pub mod fake;

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level failures raised by a venue port implementation. Business
/// rejections are not errors: they come back as `VenueResult::Rejected` so the
/// engine can record them and keep going.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("exchange error: {0}")]
    Exchange(String),
}

pub type VenuePortResult<T> = Result<T, VenueError>;

// ---------------------------------------------------------------------------
// Wire-side domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tif {
    Gtc,
    Ioc,
}

impl Tif {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Gtc => "Gtc",
            Self::Ioc => "Ioc",
        }
    }
}

/// Trigger family: stop-loss or take-profit. The venue tags conditional
/// orders with this so its UI groups them against the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

impl TriggerKind {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::StopLoss => "sl",
            Self::TakeProfit => "tp",
        }
    }
}

/// Outcome of one order-producing venue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VenueResult {
    Filled {
        order_id: u64,
        avg_px: Decimal,
        size: Decimal,
    },
    Resting {
        order_id: u64,
    },
    Rejected {
        code: String,
        message: String,
    },
}

impl VenueResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Outcome of a cancel request; cancels have no fill/rest distinction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    Rejected { message: String },
}

/// Account role as reported by the venue for a signing address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRole {
    Master,
    Agent { master: String },
    Unknown,
}

/// One open perpetual position. `size` is signed: positive long, negative
/// short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub size: Decimal,
    pub entry_px: Option<Decimal>,
}

/// Perp-side account state for one address.
#[derive(Debug, Clone)]
pub struct PerpState {
    pub account_value: Decimal,
    pub withdrawable: Decimal,
    pub positions: Vec<PositionSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SpotBalance {
    pub coin: String,
    pub total: Decimal,
}

/// Venue-imposed quanta for one instrument. `px_decimals` encodes the tick as
/// a decimal count; the five-significant-figure bound is applied on top by the
/// precision formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolMeta {
    pub sz_decimals: u32,
    pub px_decimals: u32,
}

impl SymbolMeta {
    /// Fallback for instruments absent from the venue metadata.
    pub fn default_meta() -> Self {
        Self {
            sz_decimals: 3,
            px_decimals: 2,
        }
    }
}

/// Open order row, passed through to the operator surface. Aliases accept the
/// venue's camelCase wire form; responses re-emit snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub coin: String,
    pub side: String,
    pub sz: String,
    #[serde(alias = "limitPx")]
    pub limit_px: String,
    pub oid: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(alias = "orderType", default)]
    pub order_type: Option<String>,
    #[serde(alias = "triggerCondition", default)]
    pub trigger_condition: Option<String>,
    #[serde(alias = "triggerPx", default)]
    pub trigger_px: Option<String>,
    #[serde(alias = "reduceOnly", default)]
    pub reduce_only: bool,
    #[serde(alias = "origSz", default)]
    pub orig_sz: Option<String>,
}

/// Historical fill row, passed through to the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    #[serde(default)]
    pub time: u64,
    pub coin: String,
    pub side: String,
    pub sz: String,
    pub px: String,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub oid: Option<u64>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub crossed: bool,
    #[serde(alias = "startPosition", default)]
    pub start_position: Option<String>,
    #[serde(alias = "closedPnl", default)]
    pub closed_pnl: Option<String>,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Narrow adapter over the exchange API consumed by the execution engine.
/// One production implementation (`hyperliquid`) plus a scripted fake for
/// tests; this is a closed surface.
#[async_trait]
pub trait VenuePort: Send + Sync {
    async fn user_role(&self, addr: &str) -> VenuePortResult<UserRole>;

    async fn clearinghouse_state(&self, addr: &str) -> VenuePortResult<PerpState>;

    async fn spot_state(&self, addr: &str) -> VenuePortResult<Vec<SpotBalance>>;

    async fn symbol_meta(&self) -> VenuePortResult<HashMap<String, SymbolMeta>>;

    /// Immediate execution at market. `reduce_only` is set by the reversal
    /// fallback so a re-flatten can never open fresh exposure.
    async fn market_open(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        reduce_only: bool,
    ) -> VenuePortResult<VenueResult>;

    /// Venue-provided position flattening. `None` models the venue returning
    /// a null/absent body, a distinct observable outcome that the engine's
    /// fallback branch hinges on.
    async fn market_close(&self, symbol: &str) -> VenuePortResult<Option<VenueResult>>;

    async fn limit_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        px: Decimal,
        tif: Tif,
    ) -> VenuePortResult<VenueResult>;

    /// Conditional reduce-only order (protective stop or take-profit).
    async fn trigger_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        trigger_px: Decimal,
        is_market: bool,
        kind: TriggerKind,
    ) -> VenuePortResult<VenueResult>;

    async fn cancel_order(&self, symbol: &str, oid: u64) -> VenuePortResult<CancelOutcome>;

    async fn open_orders(&self, addr: &str) -> VenuePortResult<Vec<OpenOrder>>;

    async fn order_history(&self, addr: &str) -> VenuePortResult<Vec<OrderFill>>;
}

// ---------------------------------------------------------------------------
// MetaCache: lazily filled instrument metadata
// ---------------------------------------------------------------------------

/// Caches `symbol_meta` on first use; a miss refreshes the whole map once and
/// falls back to defaults for instruments the venue does not list.
pub struct MetaCache {
    map: RwLock<HashMap<String, SymbolMeta>>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, venue: &dyn VenuePort, symbol: &str) -> VenuePortResult<SymbolMeta> {
        if let Some(meta) = self.map.read().await.get(symbol) {
            return Ok(*meta);
        }

        let fresh = venue.symbol_meta().await?;
        let mut map = self.map.write().await;
        map.extend(fresh);

        match map.get(symbol) {
            Some(meta) => Ok(*meta),
            None => {
                tracing::warn!(symbol, "symbol_meta_missing_using_defaults");
                let meta = SymbolMeta::default_meta();
                map.insert(symbol.to_string(), meta);
                Ok(meta)
            }
        }
    }
}

impl Default for MetaCache {
    fn default() -> Self {
        Self::new()
    }
}
