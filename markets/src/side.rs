use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional side of a position or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Sign applied to a price delta to compute PnL for this side: `+1` for
    /// long (profit as price rises), `-1` for short.
    pub fn pnl_sign(self) -> i64 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Exchange-level order side. An entry order on the long side is a `Buy`; an
/// entry on the short side, or an exit closing a long, is a `Sell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side required to *open* a position on `side`.
    pub fn to_open(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side required to *reduce/close* a position on `side`.
    pub fn to_close(side: Side) -> Self {
        Self::to_open(side.opposite())
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_side_round_trips() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn order_side_matches_direction() {
        assert_eq!(OrderSide::to_open(Side::Long), OrderSide::Buy);
        assert_eq!(OrderSide::to_open(Side::Short), OrderSide::Sell);
        assert_eq!(OrderSide::to_close(Side::Long), OrderSide::Sell);
        assert_eq!(OrderSide::to_close(Side::Short), OrderSide::Buy);
    }
}
