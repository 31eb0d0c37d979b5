//! Named return-aggregation intervals used to annualize a [`SharpeRatio`]
//! (`metric::sharpe`) from whatever base period its inputs were sampled at.
//!
//! [`SharpeRatio`]: crate::metric::sharpe::SharpeRatio

use chrono::TimeDelta;

/// A concrete sampling interval convertible to its [`TimeDelta`] length, so a
/// ratio computed on one interval can be rescaled onto another assuming IID
/// returns (`scale ∝ √(target / current)`).
pub trait TimeInterval {
    fn interval(&self) -> TimeDelta;
}

impl TimeInterval for TimeDelta {
    fn interval(&self) -> TimeDelta {
        *self
    }
}

/// One calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Daily;

impl TimeInterval for Daily {
    fn interval(&self) -> TimeDelta {
        TimeDelta::days(1)
    }
}

/// One trading year of 252 sessions — the convention `BacktestEngine` uses
/// to annualize a daily Sharpe ratio (§4.8 "Sharpe (√252-annualized)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Annual252;

impl TimeInterval for Annual252 {
    fn interval(&self) -> TimeDelta {
        TimeDelta::days(252)
    }
}
