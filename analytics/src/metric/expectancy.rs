//! Per-trade expectancy (§4.8 "expectancy"): the EV formula from §3's
//! `RollingMetrics` entity, expressed directly in currency terms rather than
//! as a fraction of risk.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use talus_markets::decimal::checked_div_or_zero;

/// Average net PnL per trade: `win_rate · avg_win − (1 − win_rate) · avg_loss`.
#[derive(Debug, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct Expectancy {
    pub value: Decimal,
}

impl Expectancy {
    pub fn calculate(win_rate: Decimal, avg_win: Decimal, avg_loss: Decimal) -> Self {
        let value = win_rate * avg_win - (Decimal::ONE - win_rate) * avg_loss;
        Expectancy { value }
    }

    /// Convenience over raw net PnLs rather than a pre-aggregated win rate.
    pub fn from_net_pnls(net_pnls: &[Decimal]) -> Self {
        if net_pnls.is_empty() {
            return Expectancy::default();
        }
        let total: Decimal = net_pnls.iter().sum();
        let value = checked_div_or_zero(total, Decimal::from(net_pnls.len()));
        Expectancy { value }
    }
}
