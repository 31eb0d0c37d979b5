use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_markets::{Side, Symbol};

/// The local authoritative view of an open position on one symbol (§3).
/// `PositionTracker` is the sole owner; everything else reads a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub qty: Decimal,
    pub stop_loss: Decimal,
    pub leverage: u32,
    pub strategy_id: String,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        qty: Decimal,
        stop_loss: Decimal,
        leverage: u32,
        strategy_id: String,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Position {
            symbol,
            side,
            entry_price,
            qty,
            stop_loss,
            leverage,
            strategy_id,
            opened_at,
        }
    }

    /// Subtract `qty` from this position's size, clamped to zero (§3:
    /// "`reduce(q)` subtracts qty, clamped to 0"). Returns the quantity
    /// actually removed.
    pub fn reduce(&mut self, qty: Decimal) -> Decimal {
        let removed = qty.min(self.qty).max(Decimal::ZERO);
        self.qty = (self.qty - removed).max(Decimal::ZERO);
        removed
    }

    pub fn is_closed(&self) -> bool {
        self.qty <= Decimal::ZERO
    }

    /// Unrealized PnL at `mark_price`, signed by side.
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.entry_price) * Decimal::from(self.side.pnl_sign()) * self.qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        Position::new(
            Symbol::new("BTC"),
            Side::Long,
            dec!(50000),
            dec!(0.1),
            dec!(49000),
            1,
            "donchian-48".into(),
            Utc::now(),
        )
    }

    #[test]
    fn reduce_clamps_at_zero() {
        let mut position = long_position();
        assert_eq!(position.reduce(dec!(0.3)), dec!(0.1));
        assert!(position.is_closed());
    }

    #[test]
    fn unrealized_pnl_is_signed_by_side() {
        let position = long_position();
        assert_eq!(position.unrealized_pnl(dec!(51000)), dec!(100));

        let mut short = long_position();
        short.side = Side::Short;
        assert_eq!(short.unrealized_pnl(dec!(51000)), dec!(-100));
    }
}
