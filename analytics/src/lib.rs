//! Rolling expected-value tracking, per-strategy health state, and the
//! performance metrics a backtest report is built from (§3's `RollingMetrics`
//! entity, §4.7 StrategyHealth, §4.8 BacktestEngine report).
//!
//! [`rolling`] owns the bounded per-strategy trade window and derives win
//! rate / average win / average loss / EV from it. [`health`] turns that
//! rolling state into the ENABLED/DEGRADED/DISABLED state machine the
//! evaluator consults before calling a strategy. [`metric`] holds the
//! individual report metrics (Sharpe, win rate, profit factor, drawdown,
//! expectancy). [`report`] assembles them into one `BacktestReport`.
//!
//! ```
//! use talus_analytics::metric::sharpe::SharpeRatio;
//! use talus_analytics::time::Daily;
//! use rust_decimal_macros::dec;
//!
//! let risk_free = dec!(0.0015); // 0.15%
//! let mean_ret  = dec!(0.0025); // 0.25%
//! let std_dev   = dec!(0.0200); // 2.00%
//!
//! let sharpe = SharpeRatio::calculate(risk_free, mean_ret, std_dev, Daily);
//! assert_eq!(sharpe.value, dec!(0.05));
//! ```

pub mod health;
pub mod metric;
pub mod report;
pub mod rolling;
pub mod time;

pub use health::{HealthState, StrategyHealth};
pub use rolling::{RollingEvCalculator, RollingMetrics};

use chrono::{DateTime, Utc};

/// Trait for types that carry a timestamp, used to order and window
/// per-strategy series (closed trades, equity marks) chronologically.
pub trait Timed {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// A value paired with the timestamp it was observed at.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedValue<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> TimedValue<T> {
    pub fn new(value: T, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

impl<T> Timed for TimedValue<T> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
