use rust_decimal::Decimal;

use crate::venue::{Side, SymbolMeta};

// ---------------------------------------------------------------------------
// Size truncation
// ---------------------------------------------------------------------------

/// Rounds a size toward zero to the instrument's `sz_decimals`. Truncation is
/// the only safe direction: rounding away from zero would enlarge the
/// trader's intended exposure. A zero result is returned as-is; callers
/// decide whether zero is actionable.
pub fn truncate_size(meta: &SymbolMeta, raw: Decimal) -> Decimal {
    raw.trunc_with_scale(meta.sz_decimals)
}

// ---------------------------------------------------------------------------
// Price snapping
// ---------------------------------------------------------------------------

/// Decimals the venue will accept for this price: the instrument's tick bound
/// capped so the whole number keeps at most five significant figures.
fn allowed_px_decimals(meta: &SymbolMeta, price: Decimal) -> u32 {
    let int_digits = integer_digits(price);
    let sig_fig_room = 5u32.saturating_sub(int_digits);
    meta.px_decimals.min(sig_fig_room)
}

fn integer_digits(value: Decimal) -> u32 {
    let int = value.abs().trunc().normalize();
    if int.is_zero() {
        0
    } else {
        int.to_string().len() as u32
    }
}

fn floor_to_scale(value: Decimal, scale: u32) -> Decimal {
    value.trunc_with_scale(scale)
}

fn ceil_to_scale(value: Decimal, scale: u32) -> Decimal {
    let floored = value.trunc_with_scale(scale);
    if floored == value {
        floored
    } else {
        floored + Decimal::new(1, scale)
    }
}

/// Default price rule: floor-to-tick (toward zero).
pub fn snap_entry_px(meta: &SymbolMeta, raw: Decimal) -> Decimal {
    floor_to_scale(raw, allowed_px_decimals(meta, raw))
}

/// Stop-loss trigger prices snap toward the worse-for-trader direction so the
/// protection is never looser than requested: down for longs, up for shorts.
pub fn snap_stop_px(meta: &SymbolMeta, raw: Decimal, entry_side: Side) -> Decimal {
    let scale = allowed_px_decimals(meta, raw);
    match entry_side {
        Side::Buy => floor_to_scale(raw, scale),
        Side::Sell => ceil_to_scale(raw, scale),
    }
}

/// Take-profit trigger prices snap toward the better-for-trader direction so
/// profit is taken no earlier than requested: up for longs, down for shorts.
pub fn snap_tp_px(meta: &SymbolMeta, raw: Decimal, entry_side: Side) -> Decimal {
    let scale = allowed_px_decimals(meta, raw);
    match entry_side {
        Side::Buy => ceil_to_scale(raw, scale),
        Side::Sell => floor_to_scale(raw, scale),
    }
}

/// Wire encoding for sizes and prices: no exponent, no trailing zeros.
pub fn wire_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn meta(sz: u32, px: u32) -> SymbolMeta {
        SymbolMeta {
            sz_decimals: sz,
            px_decimals: px,
        }
    }

    #[test]
    fn test_truncate_size_toward_zero() {
        let m = meta(2, 4);
        assert_eq!(truncate_size(&m, dec!(0.2)), dec!(0.20));
        assert_eq!(truncate_size(&m, dec!(10.739)), dec!(10.73));
        assert_eq!(truncate_size(&m, dec!(5.999)), dec!(5.99));
        assert_eq!(truncate_size(&m, dec!(5)), dec!(5));
    }

    #[test]
    fn test_truncate_size_never_exceeds_input() {
        let m = meta(3, 4);
        for raw in [dec!(0.12345), dec!(1.0009), dec!(42.4242)] {
            assert!(truncate_size(&m, raw) <= raw);
        }
    }

    #[test]
    fn test_truncate_size_to_zero_is_returned() {
        let m = meta(0, 4);
        assert_eq!(truncate_size(&m, dec!(0.9)), dec!(0));
    }

    #[test]
    fn test_entry_px_floors() {
        let m = meta(2, 4);
        assert_eq!(snap_entry_px(&m, dec!(175.4567)), dec!(175.45));
        assert_eq!(snap_entry_px(&m, dec!(175.45)), dec!(175.45));
    }

    #[test]
    fn test_sig_fig_cap_reduces_decimals() {
        // Five integer digits leave no room for decimals.
        let m = meta(5, 1);
        assert_eq!(snap_entry_px(&m, dec!(43210.5)), dec!(43210));
        // Three integer digits leave two decimal places.
        let m = meta(2, 4);
        assert_eq!(snap_entry_px(&m, dec!(180.4567)), dec!(180.45));
    }

    #[test]
    fn test_stop_snaps_against_the_trader() {
        let m = meta(2, 2);
        // Long: stop sits below entry, snapping down keeps protection tight.
        assert_eq!(snap_stop_px(&m, dec!(170.456), Side::Buy), dec!(170.45));
        // Short: stop sits above entry, snapping up keeps protection tight.
        assert_eq!(snap_stop_px(&m, dec!(170.456), Side::Sell), dec!(170.46));
        // Already on tick: untouched either way.
        assert_eq!(snap_stop_px(&m, dec!(170.45), Side::Sell), dec!(170.45));
    }

    #[test]
    fn test_tp_snaps_for_the_trader() {
        let m = meta(2, 2);
        assert_eq!(snap_tp_px(&m, dec!(180.001), Side::Buy), dec!(180.01));
        assert_eq!(snap_tp_px(&m, dec!(180.009), Side::Sell), dec!(180.00));
    }

    #[test]
    fn test_wire_decimal_strips_trailing_zeros() {
        assert_eq!(wire_decimal(dec!(0.20)), "0.2");
        assert_eq!(wire_decimal(dec!(5.00)), "5");
        assert_eq!(wire_decimal(dec!(10.73)), "10.73");
    }
}
