//! Individual performance metrics a backtest report (§4.8) or a live rolling
//! window (§4.7, §3 `RollingMetrics`) is built from. Each is a self-contained
//! calculation over already-aggregated inputs, so the same type is reusable
//! from both `BacktestEngine` and [`crate::rolling::RollingEvCalculator`].
//!
//! ```
//! use talus_analytics::metric::sharpe::SharpeRatio;
//! use talus_analytics::metric::drawdown::DrawdownGenerator;
//! use rust_decimal_macros::dec;
//! use chrono::{DateTime, Utc};
//!
//! let sharpe = SharpeRatio::calculate(dec!(0.0015), dec!(0.0025), dec!(0.02), chrono::TimeDelta::hours(2));
//! assert!(sharpe.value != rust_decimal::Decimal::ZERO);
//!
//! let t0 = DateTime::<Utc>::MIN_UTC;
//! let mut gen = DrawdownGenerator::init(dec!(100), t0);
//! gen.update(dec!(90), t0 + chrono::TimeDelta::days(1));
//! let dd = gen.update(dec!(120), t0 + chrono::TimeDelta::days(2));
//! assert!(dd.is_some());
//! ```

/// Maximum and per-episode drawdown from an equity curve.
pub mod drawdown;

/// Per-trade expectancy: average net PnL per trade.
pub mod expectancy;

/// Gross profit over gross loss.
pub mod profit_factor;

/// Risk-adjusted return, annualizable across [`TimeInterval`](crate::time::TimeInterval)s.
pub mod sharpe;

/// Fraction of trades that closed with positive net PnL.
pub mod win_rate;
