use crate::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol sizing and price constraints, sourced from the venue's
/// exchange-info endpoint (`LOT_SIZE`/`MARKET_LOT_SIZE`/`PRICE_FILTER` on
/// Binance, the instrument's `lotSz`/`tickSz` on OKX) and normalized into one
/// shape the rest of the pipeline consumes without caring which venue it came
/// from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: Symbol,
    /// Smallest increment a quantity may be expressed in.
    pub qty_step: Decimal,
    /// Minimum order quantity.
    pub min_qty: Decimal,
    /// Minimum notional value (`qty * price`) accepted by the venue.
    pub min_notional: Decimal,
    /// Smallest increment a price may be expressed in.
    pub price_tick: Decimal,
}

impl InstrumentSpec {
    /// Round `raw_qty` down to this instrument's step and reject if the
    /// result rounds to zero or below `min_qty`.
    pub fn normalize_quantity(&self, raw_qty: Decimal) -> Result<Decimal, InstrumentSpecError> {
        let rounded = crate::decimal::round_step_down(raw_qty, self.qty_step);
        if rounded < self.min_qty || rounded.is_zero() {
            return Err(InstrumentSpecError::QuantityBelowMinimum {
                symbol: self.symbol.clone(),
                rounded,
                min_qty: self.min_qty,
            });
        }
        Ok(rounded)
    }

    pub fn meets_min_notional(&self, qty: Decimal, price: Decimal) -> bool {
        qty * price >= self.min_notional
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InstrumentSpecError {
    #[error("quantity for {symbol} rounds to {rounded}, below minimum {min_qty}")]
    QuantityBelowMinimum {
        symbol: Symbol,
        rounded: Decimal,
        min_qty: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_spec() -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new("BTC"),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
            min_notional: dec!(5),
            price_tick: dec!(0.1),
        }
    }

    #[test]
    fn normalizes_and_accepts_valid_quantity() {
        let spec = btc_spec();
        assert_eq!(spec.normalize_quantity(dec!(0.1009)).unwrap(), dec!(0.100));
    }

    #[test]
    fn rejects_quantity_rounding_below_minimum() {
        let spec = btc_spec();
        assert!(spec.normalize_quantity(dec!(0.0001)).is_err());
    }

    #[test]
    fn checks_minimum_notional() {
        let spec = btc_spec();
        assert!(spec.meets_min_notional(dec!(0.1), dec!(50000)));
        assert!(!spec.meets_min_notional(dec!(0.00001), dec!(50000)));
    }
}
