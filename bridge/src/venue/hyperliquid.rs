use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{
    CancelOutcome, OpenOrder, OrderFill, PerpState, PositionSnapshot, Side, SpotBalance,
    SymbolMeta, Tif, TriggerKind, UserRole, VenueError, VenuePort, VenuePortResult, VenueResult,
};
use crate::clock;
use crate::config::Environment;
use crate::precision;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";
pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(20);
/// Price band applied to the IOC limit that emulates a market order.
const MARKET_SLIPPAGE: Decimal = dec!(0.05);
/// Perp price precision bound: max decimals is six minus the size decimals.
const MAX_PX_DECIMALS: u32 = 6;
const EIP712_CHAIN_ID: u64 = 1337;

// ---------------------------------------------------------------------------
// EIP-712 phantom agent (Hyperliquid exchange signing)
// ---------------------------------------------------------------------------

sol! {
    /// The venue signs a phantom agent instead of the raw action: the msgpack
    /// action hash lands in `connectionId`.
    #[derive(Debug)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

// ---------------------------------------------------------------------------
// HyperliquidClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct AssetInfo {
    index: u32,
    meta: SymbolMeta,
}

pub struct HyperliquidClient {
    http: reqwest::Client,
    base_url: String,
    signer: PrivateKeySigner,
    signer_addr: String,
    environment: Environment,
    /// Trading account all reads/writes are attributed to; starts as the
    /// signer and is rebound after agent-key resolution.
    master: RwLock<String>,
    assets: RwLock<HashMap<String, AssetInfo>>,
}

impl HyperliquidClient {
    pub fn new(environment: Environment, private_key: &str) -> Result<Self, VenueError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| VenueError::Signing(format!("invalid private key: {e}")))?;
        let signer_addr = format!("{:#x}", signer.address());

        let http = reqwest::Client::builder()
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| VenueError::Transport(e.to_string()))?;

        let base_url = match environment {
            Environment::Testnet => TESTNET_API_URL,
            Environment::Mainnet => MAINNET_API_URL,
        };

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            signer,
            signer_addr: signer_addr.clone(),
            environment,
            master: RwLock::new(signer_addr),
            assets: RwLock::new(HashMap::new()),
        })
    }

    pub fn signer_addr(&self) -> &str {
        &self.signer_addr
    }

    pub async fn set_master(&self, addr: &str) {
        *self.master.write().await = addr.to_string();
    }

    // -- transport ----------------------------------------------------------

    async fn info(&self, body: Value) -> VenuePortResult<Value> {
        let url = format!("{}/info", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VenueError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VenueError::Exchange(format!(
                "info request failed with status {status}: {text}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| VenueError::Serialization(e.to_string()))
    }

    /// Signs and submits one exchange action. A null/empty body is preserved
    /// as `Value::Null`; the close path's fallback depends on seeing it.
    async fn exchange(&self, action: Value) -> VenuePortResult<Value> {
        let nonce = clock::now_millis();
        let signature = self.sign_action(&action, nonce)?;
        let payload = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": null,
        });

        let url = format!("{}/exchange", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(WRITE_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VenueError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| VenueError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(VenueError::Exchange(format!(
                "exchange request failed with status {status}: {text}"
            )));
        }

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed).map_err(|e| VenueError::Serialization(e.to_string()))
    }

    /// Flow: msgpack the action -> keccak with nonce -> sign the phantom
    /// agent as EIP-712 typed data.
    fn sign_action(&self, action: &Value, nonce: u64) -> VenuePortResult<Value> {
        let mut bytes = rmp_serde::to_vec_named(action)
            .map_err(|e| VenueError::Serialization(format!("action encoding failed: {e}")))?;
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.push(0); // no vault address
        let connection_id = keccak256(&bytes);

        let source = match self.environment {
            Environment::Mainnet => "a",
            Environment::Testnet => "b",
        };
        let agent = Agent {
            source: source.to_string(),
            connectionId: connection_id,
        };
        let domain = eip712_domain! {
            name: "Exchange",
            version: "1",
            chain_id: EIP712_CHAIN_ID,
            verifying_contract: Address::ZERO,
        };

        let signing_hash = agent.eip712_signing_hash(&domain);
        let signature = self
            .signer
            .sign_hash_sync(&signing_hash)
            .map_err(|e| VenueError::Signing(e.to_string()))?;

        let r_bytes = signature.r().to_be_bytes::<32>();
        let s_bytes = signature.s().to_be_bytes::<32>();
        let v_byte = if signature.v() { 28u8 } else { 27u8 };
        Ok(json!({
            "r": format!("0x{}", hex::encode(r_bytes)),
            "s": format!("0x{}", hex::encode(s_bytes)),
            "v": v_byte,
        }))
    }

    // -- asset metadata -----------------------------------------------------

    async fn asset(&self, symbol: &str) -> VenuePortResult<AssetInfo> {
        if let Some(info) = self.assets.read().await.get(symbol) {
            return Ok(*info);
        }
        self.refresh_assets().await?;
        self.assets
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::Exchange(format!("unknown asset {symbol}")))
    }

    async fn refresh_assets(&self) -> VenuePortResult<()> {
        let meta = self.info(json!({"type": "meta"})).await?;
        let universe = meta
            .get("universe")
            .and_then(Value::as_array)
            .ok_or_else(|| VenueError::Serialization("meta response missing universe".into()))?;

        let mut map = self.assets.write().await;
        for (index, asset) in universe.iter().enumerate() {
            let Some(name) = asset.get("name").and_then(Value::as_str) else {
                continue;
            };
            let sz_decimals = asset
                .get("szDecimals")
                .and_then(Value::as_u64)
                .unwrap_or(3) as u32;
            map.insert(
                name.to_string(),
                AssetInfo {
                    index: index as u32,
                    meta: SymbolMeta {
                        sz_decimals,
                        px_decimals: MAX_PX_DECIMALS.saturating_sub(sz_decimals),
                    },
                },
            );
        }
        tracing::debug!(assets = map.len(), "asset_metadata_refreshed");
        Ok(())
    }

    async fn mid_price(&self, symbol: &str) -> VenuePortResult<Decimal> {
        let mids = self.info(json!({"type": "allMids"})).await?;
        mids.get(symbol)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| VenueError::Exchange(format!("no mid price for {symbol}")))
    }

    /// IOC limit priced through the book by the slippage band; this is the
    /// venue's own market-order formulation.
    async fn aggressive_px(
        &self,
        meta: &SymbolMeta,
        symbol: &str,
        side: Side,
    ) -> VenuePortResult<Decimal> {
        let mid = self.mid_price(symbol).await?;
        let raw = match side {
            Side::Buy => mid * (Decimal::ONE + MARKET_SLIPPAGE),
            Side::Sell => mid * (Decimal::ONE - MARKET_SLIPPAGE),
        };
        Ok(precision::snap_entry_px(meta, raw))
    }

    // -- wire helpers -------------------------------------------------------

    fn order_wire(
        asset: u32,
        side: Side,
        px: Decimal,
        size: Decimal,
        reduce_only: bool,
        order_type: Value,
    ) -> Value {
        json!({
            "a": asset,
            "b": side.is_buy(),
            "p": precision::wire_decimal(px),
            "s": precision::wire_decimal(size),
            "r": reduce_only,
            "t": order_type,
        })
    }

    fn order_action(order: Value) -> Value {
        json!({
            "type": "order",
            "orders": [order],
            "grouping": "na",
        })
    }

    /// `status: "ok"` alone does not mean success; the real outcome sits
    /// inside `response.data.statuses[]`. A null body or an ok-without-status
    /// body is reported as `None`.
    fn parse_order_response(value: Value) -> VenuePortResult<Option<VenueResult>> {
        if value.is_null() {
            return Ok(None);
        }
        if value.get("status").and_then(Value::as_str) != Some("ok") {
            let message = value
                .get("response")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            return Ok(Some(VenueResult::Rejected {
                code: "venue_error".to_string(),
                message,
            }));
        }

        let Some(first) = value
            .pointer("/response/data/statuses")
            .and_then(Value::as_array)
            .and_then(|statuses| statuses.first())
        else {
            return Ok(None);
        };

        if let Some(message) = first.get("error").and_then(Value::as_str) {
            return Ok(Some(VenueResult::Rejected {
                code: "order_rejected".to_string(),
                message: message.to_string(),
            }));
        }
        if let Some(filled) = first.get("filled") {
            return Ok(Some(VenueResult::Filled {
                order_id: filled.get("oid").and_then(Value::as_u64).unwrap_or(0),
                avg_px: decimal_from(filled.get("avgPx")).unwrap_or(Decimal::ZERO),
                size: decimal_from(filled.get("totalSz")).unwrap_or(Decimal::ZERO),
            }));
        }
        if let Some(resting) = first.get("resting") {
            return Ok(Some(VenueResult::Resting {
                order_id: resting.get("oid").and_then(Value::as_u64).unwrap_or(0),
            }));
        }
        Ok(None)
    }

    fn parse_cancel_response(value: Value) -> CancelOutcome {
        if value.get("status").and_then(Value::as_str) != Some("ok") {
            return CancelOutcome::Rejected {
                message: value.to_string(),
            };
        }
        match value
            .pointer("/response/data/statuses")
            .and_then(Value::as_array)
            .and_then(|statuses| statuses.first())
        {
            Some(Value::String(s)) if s == "success" => CancelOutcome::Cancelled,
            Some(status) => match status.get("error").and_then(Value::as_str) {
                Some(message) => CancelOutcome::Rejected {
                    message: message.to_string(),
                },
                None => CancelOutcome::Cancelled,
            },
            None => CancelOutcome::Cancelled,
        }
    }
}

fn decimal_from(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn require_order(result: Option<VenueResult>) -> VenueResult {
    result.unwrap_or(VenueResult::Rejected {
        code: "null_response".to_string(),
        message: "venue returned no order status".to_string(),
    })
}

// ---------------------------------------------------------------------------
// VenuePort impl
// ---------------------------------------------------------------------------

#[async_trait]
impl VenuePort for HyperliquidClient {
    async fn user_role(&self, addr: &str) -> VenuePortResult<UserRole> {
        let value = self.info(json!({"type": "userRole", "user": addr})).await?;
        Ok(match value.get("role").and_then(Value::as_str) {
            Some("agent") => match value.pointer("/data/user").and_then(Value::as_str) {
                Some(master) => UserRole::Agent {
                    master: master.to_string(),
                },
                None => UserRole::Unknown,
            },
            Some("user") | Some("master") | Some("subAccount") | Some("vault") => UserRole::Master,
            _ => UserRole::Unknown,
        })
    }

    async fn clearinghouse_state(&self, addr: &str) -> VenuePortResult<PerpState> {
        let value = self
            .info(json!({"type": "clearinghouseState", "user": addr}))
            .await?;

        let positions = value
            .get("assetPositions")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let position = entry.get("position")?;
                        Some(PositionSnapshot {
                            symbol: position.get("coin")?.as_str()?.to_string(),
                            size: decimal_from(position.get("szi"))?,
                            entry_px: decimal_from(position.get("entryPx")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(PerpState {
            account_value: decimal_from(value.pointer("/marginSummary/accountValue"))
                .unwrap_or(Decimal::ZERO),
            withdrawable: decimal_from(value.get("withdrawable")).unwrap_or(Decimal::ZERO),
            positions,
        })
    }

    async fn spot_state(&self, addr: &str) -> VenuePortResult<Vec<SpotBalance>> {
        let value = self
            .info(json!({"type": "spotClearinghouseState", "user": addr}))
            .await?;
        Ok(value
            .get("balances")
            .and_then(Value::as_array)
            .map(|balances| {
                balances
                    .iter()
                    .filter_map(|balance| {
                        Some(SpotBalance {
                            coin: balance.get("coin")?.as_str()?.to_string(),
                            total: decimal_from(balance.get("total"))?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn symbol_meta(&self) -> VenuePortResult<HashMap<String, SymbolMeta>> {
        self.refresh_assets().await?;
        Ok(self
            .assets
            .read()
            .await
            .iter()
            .map(|(name, info)| (name.clone(), info.meta))
            .collect())
    }

    async fn market_open(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        reduce_only: bool,
    ) -> VenuePortResult<VenueResult> {
        let asset = self.asset(symbol).await?;
        let px = self.aggressive_px(&asset.meta, symbol, side).await?;
        let order = Self::order_wire(
            asset.index,
            side,
            px,
            size,
            reduce_only,
            json!({"limit": {"tif": Tif::Ioc.as_wire()}}),
        );
        let response = self.exchange(Self::order_action(order)).await?;
        Ok(require_order(Self::parse_order_response(response)?))
    }

    async fn market_close(&self, symbol: &str) -> VenuePortResult<Option<VenueResult>> {
        let master = self.master.read().await.clone();
        let state = self.clearinghouse_state(&master).await?;
        let Some(position) = state
            .positions
            .iter()
            .find(|p| p.symbol == symbol && !p.size.is_zero())
        else {
            return Ok(Some(VenueResult::Rejected {
                code: "no_position".to_string(),
                message: format!("no open position for {symbol}"),
            }));
        };

        let side = if position.size > Decimal::ZERO {
            Side::Sell
        } else {
            Side::Buy
        };
        let asset = self.asset(symbol).await?;
        let px = self.aggressive_px(&asset.meta, symbol, side).await?;
        let order = Self::order_wire(
            asset.index,
            side,
            px,
            position.size.abs(),
            true,
            json!({"limit": {"tif": Tif::Ioc.as_wire()}}),
        );
        let response = self.exchange(Self::order_action(order)).await?;
        Self::parse_order_response(response)
    }

    async fn limit_order(
        &self,
        symbol: &str,
        side: Side,
        size: Decimal,
        px: Decimal,
        tif: Tif,
    ) -> VenuePortResult<VenueResult> {
        let asset = self.asset(symbol).await?;
        let order = Self::order_wire(
            asset.index,
            side,
            px,
            size,
            false,
            json!({"limit": {"tif": tif.as_wire()}}),
        );
        let response = self.exchange(Self::order_action(order)).await?;
        Ok(require_order(Self::parse_order_response(response)?))
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
        let asset = self.asset(symbol).await?;
        let order = Self::order_wire(
            asset.index,
            side,
            trigger_px,
            size,
            true,
            json!({
                "trigger": {
                    "isMarket": is_market,
                    "triggerPx": precision::wire_decimal(trigger_px),
                    "tpsl": kind.as_wire(),
                }
            }),
        );
        let response = self.exchange(Self::order_action(order)).await?;
        Ok(require_order(Self::parse_order_response(response)?))
    }

    async fn cancel_order(&self, symbol: &str, oid: u64) -> VenuePortResult<CancelOutcome> {
        let asset = self.asset(symbol).await?;
        let action = json!({
            "type": "cancel",
            "cancels": [{"a": asset.index, "o": oid}],
        });
        let response = self.exchange(action).await?;
        Ok(Self::parse_cancel_response(response))
    }

    async fn open_orders(&self, addr: &str) -> VenuePortResult<Vec<OpenOrder>> {
        let value = self.info(json!({"type": "openOrders", "user": addr})).await?;
        serde_json::from_value(value).map_err(|e| VenueError::Serialization(e.to_string()))
    }

    async fn order_history(&self, addr: &str) -> VenuePortResult<Vec<OrderFill>> {
        let value = self.info(json!({"type": "userFills", "user": addr})).await?;
        serde_json::from_value(value).map_err(|e| VenueError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> HyperliquidClient {
        HyperliquidClient::new(
            Environment::Testnet,
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        )
        .unwrap()
    }

    #[test]
    fn test_signer_address_shape() {
        let client = make_client();
        let addr = client.signer_addr();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn test_action_signature_is_deterministic() {
        let client = make_client();
        let action = json!({"type": "order", "orders": [], "grouping": "na"});

        let a = client.sign_action(&action, 1_700_000_000_000).unwrap();
        let b = client.sign_action(&action, 1_700_000_000_000).unwrap();
        assert_eq!(a, b, "same action and nonce must sign identically");

        let c = client.sign_action(&action, 1_700_000_000_001).unwrap();
        assert_ne!(a, c, "a different nonce must change the signature");

        let v = a.get("v").and_then(Value::as_u64).unwrap();
        assert!(v == 27 || v == 28);
        assert!(a.get("r").and_then(Value::as_str).unwrap().starts_with("0x"));
    }

    #[test]
    fn test_order_wire_shape() {
        let order = HyperliquidClient::order_wire(
            5,
            Side::Buy,
            dec!(172.50),
            dec!(0.20),
            false,
            json!({"limit": {"tif": "Gtc"}}),
        );
        assert_eq!(order["a"], 5);
        assert_eq!(order["b"], true);
        assert_eq!(order["p"], "172.5");
        assert_eq!(order["s"], "0.2");
        assert_eq!(order["r"], false);
        assert_eq!(order["t"]["limit"]["tif"], "Gtc");
    }

    #[test]
    fn test_parse_filled_response() {
        let value = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [
                {"filled": {"oid": 77, "avgPx": "175.2", "totalSz": "0.2"}}
            ]}}
        });
        let result = HyperliquidClient::parse_order_response(value).unwrap().unwrap();
        assert_eq!(
            result,
            VenueResult::Filled {
                order_id: 77,
                avg_px: dec!(175.2),
                size: dec!(0.2),
            }
        );
    }

    #[test]
    fn test_parse_resting_response() {
        let value = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [{"resting": {"oid": 42}}]}}
        });
        let result = HyperliquidClient::parse_order_response(value).unwrap().unwrap();
        assert_eq!(result, VenueResult::Resting { order_id: 42 });
    }

    #[test]
    fn test_parse_error_inside_ok_status() {
        // The venue answers ok at the top level even when the order failed.
        let value = json!({
            "status": "ok",
            "response": {"type": "order", "data": {"statuses": [
                {"error": "Order could not immediately match against any resting orders."}
            ]}}
        });
        let result = HyperliquidClient::parse_order_response(value).unwrap().unwrap();
        assert!(result.is_rejected());
    }

    #[test]
    fn test_parse_null_response_is_distinct() {
        let result = HyperliquidClient::parse_order_response(Value::Null).unwrap();
        assert!(result.is_none(), "null body must not collapse into a rejection");
    }

    #[test]
    fn test_parse_top_level_error() {
        let value = json!({"status": "err", "response": "insufficient margin"});
        let result = HyperliquidClient::parse_order_response(value).unwrap().unwrap();
        assert!(
            matches!(result, VenueResult::Rejected { ref message, .. } if message == "insufficient margin")
        );
    }

    #[test]
    fn test_parse_cancel_responses() {
        let ok = json!({
            "status": "ok",
            "response": {"type": "cancel", "data": {"statuses": ["success"]}}
        });
        assert_eq!(
            HyperliquidClient::parse_cancel_response(ok),
            CancelOutcome::Cancelled
        );

        let failed = json!({
            "status": "ok",
            "response": {"type": "cancel", "data": {"statuses": [
                {"error": "Order was never placed, already canceled, or filled."}
            ]}}
        });
        assert!(matches!(
            HyperliquidClient::parse_cancel_response(failed),
            CancelOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_require_order_maps_null_to_rejection() {
        let result = require_order(None);
        assert!(matches!(result, VenueResult::Rejected { ref code, .. } if code == "null_response"));
    }
}
