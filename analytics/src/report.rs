//! Assembles the full backtest performance report (§4.8: "Report metrics:
//! total return %, CAGR, max drawdown %, Sharpe (√252-annualized), win rate,
//! profit factor, expectancy, fee impact, equity curve").

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use talus_execution::trade::ClosedTrade;
use talus_markets::decimal::checked_div_or_zero;

use crate::metric::drawdown::max_drawdown;
use crate::metric::expectancy::Expectancy;
use crate::metric::profit_factor::ProfitFactor;
use crate::metric::sharpe::SharpeRatio;
use crate::metric::win_rate::WinRate;
use crate::time::{Annual252, Daily};

/// One full backtest run's performance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub total_return_pct: Decimal,
    pub cagr_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_annualized: Decimal,
    pub win_rate: Decimal,
    pub profit_factor: Decimal,
    pub expectancy: Decimal,
    pub total_fees: Decimal,
    pub fee_impact_pct: Decimal,
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,
}

/// Builds a [`BacktestReport`] from the run's equity curve and closed trades.
///
/// Requires at least two equity curve points (the seeded starting balance
/// plus at least one mark) to produce a meaningful CAGR/Sharpe; shorter
/// curves degrade those two fields to zero rather than panicking.
pub fn generate(
    initial_capital: Decimal,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    closed_trades: &[ClosedTrade],
) -> BacktestReport {
    let final_equity = equity_curve
        .last()
        .map(|(_, equity)| *equity)
        .unwrap_or(initial_capital);

    let total_return_pct = checked_div_or_zero(final_equity - initial_capital, initial_capital) * Decimal::from(100);
    let cagr_pct = cagr(initial_capital, final_equity, &equity_curve);
    let max_drawdown_pct = max_drawdown(&equity_curve) * Decimal::from(100);
    let sharpe_annualized = annualized_sharpe(&equity_curve);

    let wins = closed_trades.iter().filter(|t| t.is_win()).count();
    let win_rate = WinRate::calculate(Decimal::from(wins), Decimal::from(closed_trades.len()))
        .map(|w| w.value)
        .unwrap_or(Decimal::ZERO);

    let gross_profit: Decimal = closed_trades
        .iter()
        .map(ClosedTrade::net_pnl)
        .filter(|pnl| *pnl > Decimal::ZERO)
        .sum();
    let gross_loss: Decimal = closed_trades
        .iter()
        .map(ClosedTrade::net_pnl)
        .filter(|pnl| *pnl < Decimal::ZERO)
        .map(|pnl| -pnl)
        .sum();
    let profit_factor = ProfitFactor::calculate(gross_profit, gross_loss)
        .map(|pf| pf.value)
        .unwrap_or(Decimal::ONE);

    let net_pnls: Vec<Decimal> = closed_trades.iter().map(ClosedTrade::net_pnl).collect();
    let expectancy = Expectancy::from_net_pnls(&net_pnls).value;

    let total_fees: Decimal = closed_trades.iter().map(|t| t.fee).sum();
    let gross_pnl_total: Decimal = closed_trades.iter().map(|t| t.gross_pnl).sum();
    let fee_impact_pct = if gross_pnl_total.is_zero() {
        Decimal::ZERO
    } else {
        checked_div_or_zero(total_fees, gross_pnl_total.abs()) * Decimal::from(100)
    };

    BacktestReport {
        total_return_pct,
        cagr_pct,
        max_drawdown_pct,
        sharpe_annualized,
        win_rate,
        profit_factor,
        expectancy,
        total_fees,
        fee_impact_pct,
        equity_curve,
    }
}

/// `(finalEquity/initial)^(365/days) − 1`, scaled to a percentage (§4.8).
/// Zero when the run spans less than a day or `initial_capital` is zero.
fn cagr(initial_capital: Decimal, final_equity: Decimal, equity_curve: &[(DateTime<Utc>, Decimal)]) -> Decimal {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return Decimal::ZERO;
    };

    let days = (last.0 - first.0).num_days();
    if days <= 0 || initial_capital.is_zero() {
        return Decimal::ZERO;
    }

    let ratio = checked_div_or_zero(final_equity, initial_capital);
    if ratio <= Decimal::ZERO {
        return Decimal::new(-100, 0);
    }

    let exponent = checked_div_or_zero(Decimal::from(365), Decimal::from(days));
    let growth = ratio
        .checked_powd(exponent)
        .unwrap_or(Decimal::ZERO);

    (growth - Decimal::ONE) * Decimal::from(100)
}

/// Daily returns derived from consecutive equity marks, annualized to 252
/// trading days via [`SharpeRatio::scale`] (§4.8 "Sharpe (√252-annualized)").
/// Risk-free rate is taken as zero — the spec names no configured rate for it.
fn annualized_sharpe(equity_curve: &[(DateTime<Utc>, Decimal)]) -> Decimal {
    if equity_curve.len() < 2 {
        return Decimal::ZERO;
    }

    let returns: Vec<Decimal> = equity_curve
        .windows(2)
        .map(|pair| checked_div_or_zero(pair[1].1 - pair[0].1, pair[0].1))
        .collect();

    let n = Decimal::from(returns.len());
    let mean: Decimal = returns.iter().sum::<Decimal>() / n;
    let variance: Decimal = returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / n;
    let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);

    SharpeRatio::calculate(Decimal::ZERO, mean, std_dev, Daily)
        .scale(Annual252)
        .value
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use talus_execution::trade::ExitReason;
    use talus_markets::{Side, Symbol};

    fn trade(net_pnl: Decimal, fee: Decimal) -> ClosedTrade {
        ClosedTrade {
            id: "t1".into(),
            symbol: Symbol::new("BTC"),
            side: Side::Long,
            entry_price: dec!(100),
            exit_price: dec!(100) + net_pnl + fee,
            qty: dec!(1),
            gross_pnl: net_pnl + fee,
            fee,
            strategy_id: "donchian-48".into(),
            exit_reason: ExitReason::TakeProfit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn total_return_reflects_equity_change() {
        let t0 = DateTime::<Utc>::MIN_UTC;
        let curve = vec![
            (t0, dec!(10000)),
            (t0 + chrono::TimeDelta::days(30), dec!(11000)),
        ];
        let report = generate(dec!(10000), curve, &[]);
        assert_eq!(report.total_return_pct, dec!(10));
    }

    #[test]
    fn win_rate_and_profit_factor_from_trades() {
        let trades = vec![trade(dec!(100), dec!(1)), trade(dec!(-50), dec!(1))];
        let t0 = DateTime::<Utc>::MIN_UTC;
        let curve = vec![(t0, dec!(10000)), (t0 + chrono::TimeDelta::days(1), dec!(10050))];
        let report = generate(dec!(10000), curve, &trades);
        assert_eq!(report.win_rate, dec!(0.5));
        assert_eq!(report.profit_factor, dec!(2));
    }

    #[test]
    fn empty_run_has_zero_metrics() {
        let report = generate(dec!(10000), vec![], &[]);
        assert_eq!(report.total_return_pct, Decimal::ZERO);
        assert_eq!(report.cagr_pct, Decimal::ZERO);
        assert_eq!(report.max_drawdown_pct, Decimal::ZERO);
    }

    #[test]
    fn fee_impact_is_zero_when_gross_pnl_is_zero_but_fees_are_reported() {
        // gross_pnl = net_pnl + fee: (48+2) + (-52+2) = 50 - 50 = 0
        let trades = vec![trade(dec!(48), dec!(2)), trade(dec!(-52), dec!(2))];
        let report = generate(dec!(10000), vec![], &trades);
        assert_eq!(report.fee_impact_pct, Decimal::ZERO);
        assert_eq!(report.total_fees, dec!(4));
    }
}
