//! Bounded per-strategy closed-trade windows and the rolling metrics derived
//! from them (§3 `RollingMetrics`, §3 "`RollingEVCalculator` owns per-strategy
//! bounded deques of closed trades (window N, default 100)").

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_execution::trade::ClosedTrade;
use talus_markets::decimal::checked_div_or_zero;

use crate::metric::expectancy::Expectancy;
use crate::metric::win_rate::WinRate;

/// Snapshot of a strategy's recent performance, recomputed from its trade
/// window on every close (§3: "EV = winRate·avgWin − (1−winRate)·avgLoss").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingMetrics {
    pub strategy_id: String,
    pub sample_size: usize,
    pub ev: Decimal,
    pub win_rate: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub consecutive_losses: u32,
}

impl RollingMetrics {
    fn from_trades(strategy_id: &str, trades: &VecDeque<ClosedTrade>) -> Self {
        let sample_size = trades.len();
        if sample_size == 0 {
            return RollingMetrics {
                strategy_id: strategy_id.to_string(),
                ..Default::default()
            };
        }

        let mut win_total = Decimal::ZERO;
        let mut win_count = 0usize;
        let mut loss_total = Decimal::ZERO;
        let mut loss_count = 0usize;

        for trade in trades {
            let net = trade.net_pnl();
            if net > Decimal::ZERO {
                win_total += net;
                win_count += 1;
            } else if net < Decimal::ZERO {
                loss_total += -net;
                loss_count += 1;
            }
        }

        let win_rate = WinRate::calculate(Decimal::from(win_count), Decimal::from(sample_size))
            .map(|w| w.value)
            .unwrap_or(Decimal::ZERO);
        let avg_win = checked_div_or_zero(win_total, Decimal::from(win_count));
        let avg_loss = checked_div_or_zero(loss_total, Decimal::from(loss_count));
        let ev = Expectancy::calculate(win_rate, avg_win, avg_loss).value;

        let consecutive_losses = trades
            .iter()
            .rev()
            .take_while(|trade| trade.net_pnl() <= Decimal::ZERO)
            .count() as u32;

        RollingMetrics {
            strategy_id: strategy_id.to_string(),
            sample_size,
            ev,
            win_rate,
            avg_win,
            avg_loss,
            consecutive_losses,
        }
    }
}

/// Owns each strategy's bounded window of recent [`ClosedTrade`]s and
/// recomputes [`RollingMetrics`] whenever a new one closes.
#[derive(Debug)]
pub struct RollingEvCalculator {
    window: usize,
    trades: HashMap<String, VecDeque<ClosedTrade>>,
}

impl RollingEvCalculator {
    /// `window` is the trailing trade count kept per strategy (§3 default 100).
    pub fn new(window: usize) -> Self {
        RollingEvCalculator {
            window,
            trades: HashMap::new(),
        }
    }

    /// Record a freshly closed trade and return the strategy's updated
    /// [`RollingMetrics`] (§4.7 step 1, "On each close: update rolling metrics").
    pub fn record(&mut self, trade: ClosedTrade) -> RollingMetrics {
        let strategy_id = trade.strategy_id.clone();
        let deque = self.trades.entry(strategy_id.clone()).or_default();
        deque.push_back(trade);
        while deque.len() > self.window {
            deque.pop_front();
        }
        RollingMetrics::from_trades(&strategy_id, deque)
    }

    /// Current metrics for `strategy_id` without recording a new trade.
    pub fn metrics(&self, strategy_id: &str) -> RollingMetrics {
        match self.trades.get(strategy_id) {
            Some(deque) => RollingMetrics::from_trades(strategy_id, deque),
            None => RollingMetrics {
                strategy_id: strategy_id.to_string(),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use talus_execution::trade::ExitReason;
    use talus_markets::{Side, Symbol};

    fn trade(strategy_id: &str, net_pnl: Decimal) -> ClosedTrade {
        // fee of zero keeps net_pnl == gross_pnl for readable test inputs.
        ClosedTrade {
            id: format!("t-{strategy_id}-{net_pnl}"),
            symbol: Symbol::new("BTC"),
            side: Side::Long,
            entry_price: dec!(100),
            exit_price: dec!(100) + net_pnl,
            qty: dec!(1),
            gross_pnl: net_pnl,
            fee: Decimal::ZERO,
            strategy_id: strategy_id.into(),
            exit_reason: ExitReason::TakeProfit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn window_evicts_oldest_trade() {
        let mut calc = RollingEvCalculator::new(2);
        calc.record(trade("s1", dec!(10)));
        calc.record(trade("s1", dec!(-5)));
        let metrics = calc.record(trade("s1", dec!(20)));
        assert_eq!(metrics.sample_size, 2);
    }

    #[test]
    fn consecutive_losses_count_from_most_recent() {
        let mut calc = RollingEvCalculator::new(10);
        calc.record(trade("s1", dec!(10)));
        calc.record(trade("s1", dec!(-5)));
        let metrics = calc.record(trade("s1", dec!(-3)));
        assert_eq!(metrics.consecutive_losses, 2);
    }

    #[test]
    fn ev_matches_win_rate_formula() {
        let mut calc = RollingEvCalculator::new(10);
        calc.record(trade("s1", dec!(100)));
        let metrics = calc.record(trade("s1", dec!(-50)));
        // win_rate=0.5, avg_win=100, avg_loss=50 -> ev = 0.5*100 - 0.5*50 = 25
        assert_eq!(metrics.ev, dec!(25));
    }

    #[test]
    fn unknown_strategy_has_empty_metrics() {
        let calc = RollingEvCalculator::new(10);
        let metrics = calc.metrics("unknown");
        assert_eq!(metrics.sample_size, 0);
        assert_eq!(metrics.ev, Decimal::ZERO);
    }
}
