use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_markets::{Side, Symbol};

/// Why a position exit was triggered. Carried on exit [`Signal`]s and on the
/// resulting [`ClosedTrade`] for reporting.
///
/// [`Signal`]: talus_trader::Signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeStop,
    StrategyExit,
    ForceClose,
}

/// An append-only record of one closed (or partially closed) position slice
/// (§3). Produced by `PositionTracker` in live trading and by
/// `talus-backtest::BacktestEngine` in simulation — the same shape feeds
/// both `talus-risk::RiskGate::record_trade_result` and
/// `talus-analytics`'s rolling EV and backtest reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub qty: Decimal,
    pub gross_pnl: Decimal,
    pub fee: Decimal,
    pub strategy_id: String,
    pub exit_reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    /// `netPnL = grossPnL − fee` (§3 invariant).
    pub fn net_pnl(&self) -> Decimal {
        self.gross_pnl - self.fee
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl() > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(gross: Decimal, fee: Decimal) -> ClosedTrade {
        ClosedTrade {
            id: "t1".into(),
            symbol: Symbol::new("BTC"),
            side: Side::Long,
            entry_price: dec!(100),
            exit_price: dec!(101),
            qty: dec!(1),
            gross_pnl: gross,
            fee,
            strategy_id: "donchian-48".into(),
            exit_reason: ExitReason::TakeProfit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn net_pnl_subtracts_fee() {
        let trade = trade(dec!(10), dec!(1));
        assert_eq!(trade.net_pnl(), dec!(9));
        assert!(trade.is_win());
    }

    #[test]
    fn loss_when_net_is_negative() {
        let trade = trade(dec!(1), dec!(2));
        assert!(!trade.is_win());
    }
}
