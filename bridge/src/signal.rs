use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::BridgeError;
use crate::venue::Side;

pub const MAX_TP_LEVELS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Market,
    Limit,
}

/// One take-profit level as received. `size` is the legacy `tpN_perc` field:
/// an absolute child size in base units, not a percentage, despite the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpLevel {
    pub level: u8,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
}

/// A validated inbound webhook describing one intended trade.
#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entry: EntryKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub take_profits: Vec<TpLevel>,
    pub strategy_id: Option<String>,
}

impl Signal {
    /// Validates the raw webhook payload against the signal schema. Every
    /// failure maps to `InvalidSignal` with a field-specific message.
    pub fn from_payload(payload: &Value) -> Result<Self, BridgeError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| invalid("payload must be a JSON object"))?;

        let symbol = match obj.get("symbol").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.trim().to_uppercase(),
            _ => return Err(invalid("missing required field: symbol")),
        };

        let side = match obj.get("side").and_then(Value::as_str).map(str::to_lowercase) {
            Some(s) if s == "buy" => Side::Buy,
            Some(s) if s == "sell" => Side::Sell,
            other => {
                return Err(invalid(&format!(
                    "invalid or missing side: {other:?}, must be 'buy' or 'sell'"
                )))
            }
        };

        let entry = match obj.get("entry").and_then(Value::as_str).map(str::to_lowercase) {
            None => EntryKind::Market,
            Some(e) if e == "market" => EntryKind::Market,
            Some(e) if e == "limit" => EntryKind::Limit,
            Some(e) => {
                return Err(invalid(&format!(
                    "invalid entry type: {e}, must be 'market' or 'limit'"
                )))
            }
        };

        let quantity = decimal_field(obj, "quantity")?
            .ok_or_else(|| invalid("missing required field: quantity"))?;
        if quantity <= Decimal::ZERO {
            return Err(invalid(&format!("invalid quantity: {quantity}, must be > 0")));
        }

        let price = positive_or_absent(obj, "price")?;
        if entry == EntryKind::Limit && price.is_none() {
            return Err(invalid("limit order requires a positive price"));
        }

        let stop = positive_or_absent(obj, "stop")?;

        let mut take_profits = Vec::new();
        for level in 1..=MAX_TP_LEVELS {
            let tp_price = positive_or_absent(obj, &format!("tp{level}_price"))?;
            let tp_size = positive_or_absent(obj, &format!("tp{level}_perc"))?;
            if tp_price.is_some() || tp_size.is_some() {
                take_profits.push(TpLevel {
                    level,
                    price: tp_price,
                    size: tp_size,
                });
            }
        }

        let strategy_id = obj
            .get("strategy_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(Self {
            symbol,
            side,
            entry,
            quantity,
            price,
            stop,
            take_profits,
            strategy_id,
        })
    }
}

fn invalid(message: &str) -> BridgeError {
    BridgeError::InvalidSignal(message.to_string())
}

/// Reads an optional decimal field, accepting both string and number JSON
/// encodings (the charting platform emits either depending on template).
fn decimal_field(
    obj: &serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<Decimal>, BridgeError> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| invalid(&format!("field {name} is not a valid decimal: '{s}'"))),
        Some(Value::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| invalid(&format!("field {name} is not a representable decimal: {n}"))),
        Some(other) => Err(invalid(&format!(
            "field {name} must be a decimal string, got {other}"
        ))),
    }
}

/// Optional price/size fields: zero means "not set" (legacy webhook templates
/// send 0 for unused levels); negative values are a schema violation.
fn positive_or_absent(
    obj: &serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<Decimal>, BridgeError> {
    match decimal_field(obj, name)? {
        None => Ok(None),
        Some(v) if v.is_zero() => Ok(None),
        Some(v) if v < Decimal::ZERO => {
            Err(invalid(&format!("field {name} must be positive, got {v}")))
        }
        Some(v) => Ok(Some(v)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_market_signal() {
        let payload = json!({"symbol": "sol", "side": "buy", "entry": "market", "quantity": "0.2"});
        let signal = Signal::from_payload(&payload).unwrap();
        assert_eq!(signal.symbol, "SOL");
        assert_eq!(signal.side, Side::Buy);
        assert_eq!(signal.entry, EntryKind::Market);
        assert_eq!(signal.quantity, dec!(0.2));
        assert!(signal.strategy_id.is_none());
    }

    #[test]
    fn test_parse_full_stack_signal() {
        let payload = json!({
            "symbol": "SOL", "side": "buy", "entry": "market", "quantity": "0.2",
            "stop": "170.0", "tp1_price": "180.0", "tp2_perc": "10",
            "strategy_id": "IMBA_HYPER"
        });
        let signal = Signal::from_payload(&payload).unwrap();
        assert_eq!(signal.stop, Some(dec!(170.0)));
        assert_eq!(signal.take_profits.len(), 2);
        assert_eq!(signal.take_profits[0].level, 1);
        assert_eq!(signal.take_profits[0].price, Some(dec!(180.0)));
        assert_eq!(signal.take_profits[0].size, None);
        assert_eq!(signal.take_profits[1].level, 2);
        assert_eq!(signal.take_profits[1].size, Some(dec!(10)));
        assert_eq!(signal.strategy_id.as_deref(), Some("IMBA_HYPER"));
    }

    #[test]
    fn test_numeric_fields_accept_json_numbers() {
        let payload = json!({"symbol": "ETH", "side": "sell", "quantity": 1.5, "stop": 2400});
        let signal = Signal::from_payload(&payload).unwrap();
        assert_eq!(signal.quantity, dec!(1.5));
        assert_eq!(signal.stop, Some(dec!(2400)));
        // entry defaults to market when omitted
        assert_eq!(signal.entry, EntryKind::Market);
    }

    #[test]
    fn test_limit_requires_price() {
        let payload = json!({"symbol": "SOL", "side": "buy", "entry": "limit", "quantity": "1"});
        let err = Signal::from_payload(&payload).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidSignal(_)));
    }

    #[test]
    fn test_rejects_bad_side_and_quantity() {
        let payload = json!({"symbol": "SOL", "side": "hold", "quantity": "1"});
        assert!(Signal::from_payload(&payload).is_err());

        let payload = json!({"symbol": "SOL", "side": "buy", "quantity": "0"});
        assert!(Signal::from_payload(&payload).is_err());

        let payload = json!({"symbol": "SOL", "side": "buy", "quantity": "-3"});
        assert!(Signal::from_payload(&payload).is_err());
    }

    #[test]
    fn test_zero_tp_fields_are_absent() {
        let payload = json!({
            "symbol": "SOL", "side": "buy", "quantity": "1",
            "tp1_price": "0", "tp2_price": "180"
        });
        let signal = Signal::from_payload(&payload).unwrap();
        assert_eq!(signal.take_profits.len(), 1);
        assert_eq!(signal.take_profits[0].level, 2);
    }

    #[test]
    fn test_negative_optional_field_is_invalid() {
        let payload = json!({"symbol": "SOL", "side": "buy", "quantity": "1", "stop": "-170"});
        assert!(Signal::from_payload(&payload).is_err());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(Signal::from_payload(&json!("just a string")).is_err());
        assert!(Signal::from_payload(&json!(["a", "b"])).is_err());
    }
}
