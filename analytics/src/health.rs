//! Per-strategy health state machine (§4.7): degrades or disables a strategy
//! whose rolling expected value has turned negative, before the evaluator
//! lets it act on the next bar.

use serde::{Deserialize, Serialize};

use crate::rolling::RollingMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Enabled,
    Degraded,
    Disabled,
}

/// Thresholds a [`RollingMetrics`] snapshot is judged against (from
/// `HealthSettings`: `monitor.health.*`, `monitor.ev.min`).
#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub min_sample: u32,
    pub max_consecutive_losses: u32,
    pub min_ev_negative_trades: u32,
    pub ev_min: rust_decimal::Decimal,
}

/// One strategy's current [`HealthState`], re-evaluated on every closed
/// trade. A manual override rolls the state forward independent of the
/// rolling metrics and is logged (§4.7: "Manual enable/disable override...").
#[derive(Debug, Clone)]
pub struct StrategyHealth {
    strategy_id: String,
    state: HealthState,
}

impl StrategyHealth {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        StrategyHealth {
            strategy_id: strategy_id.into(),
            state: HealthState::Enabled,
        }
    }

    /// Restore a previously persisted state (§4.7: "States persist to disk
    /// on every transition; at startup, the evaluator honors them").
    pub fn restore(strategy_id: impl Into<String>, state: HealthState) -> Self {
        StrategyHealth {
            strategy_id: strategy_id.into(),
            state,
        }
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.state == HealthState::Disabled
    }

    /// Apply the §4.7 decision ladder against `metrics`. Returns `true` when
    /// the state changed (the caller should persist the new state).
    pub fn evaluate(&mut self, metrics: &RollingMetrics, thresholds: &HealthThresholds) -> bool {
        let previous = self.state;

        let negative_ev = metrics.ev < thresholds.ev_min;
        let enough_sample = metrics.sample_size as u32 >= thresholds.min_sample;

        self.state = if metrics.consecutive_losses > thresholds.max_consecutive_losses {
            HealthState::Disabled
        } else if negative_ev && metrics.consecutive_losses >= thresholds.max_consecutive_losses {
            HealthState::Disabled
        } else if negative_ev && metrics.sample_size as u32 >= thresholds.min_ev_negative_trades {
            HealthState::Degraded
        } else if self.state == HealthState::Degraded && enough_sample && !negative_ev {
            HealthState::Enabled
        } else {
            self.state
        };

        self.state != previous
    }

    /// Manual override (§4.7): forces a state regardless of rolling metrics.
    pub fn override_state(&mut self, state: HealthState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            min_sample: 30,
            max_consecutive_losses: 7,
            min_ev_negative_trades: 30,
            ev_min: Decimal::ZERO,
        }
    }

    use rust_decimal::Decimal;

    fn metrics(sample_size: usize, ev: Decimal, consecutive_losses: u32) -> RollingMetrics {
        RollingMetrics {
            strategy_id: "s1".into(),
            sample_size,
            ev,
            win_rate: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            consecutive_losses,
        }
    }

    #[test]
    fn disables_when_consecutive_losses_exceed_max() {
        let mut health = StrategyHealth::new("s1");
        let changed = health.evaluate(&metrics(5, dec!(10), 8), &thresholds());
        assert!(changed);
        assert_eq!(health.state(), HealthState::Disabled);
    }

    #[test]
    fn degrades_on_negative_ev_with_enough_sample() {
        let mut health = StrategyHealth::new("s1");
        let changed = health.evaluate(&metrics(40, dec!(-1), 2), &thresholds());
        assert!(changed);
        assert_eq!(health.state(), HealthState::Degraded);
    }

    #[test]
    fn stays_enabled_when_sample_too_small_for_degrade() {
        let mut health = StrategyHealth::new("s1");
        let changed = health.evaluate(&metrics(5, dec!(-1), 2), &thresholds());
        assert!(!changed);
        assert_eq!(health.state(), HealthState::Enabled);
    }

    #[test]
    fn recovers_from_degraded_once_ev_clears_and_sample_sufficient() {
        let mut health = StrategyHealth::new("s1");
        health.evaluate(&metrics(40, dec!(-1), 2), &thresholds());
        assert_eq!(health.state(), HealthState::Degraded);

        let changed = health.evaluate(&metrics(45, dec!(5), 0), &thresholds());
        assert!(changed);
        assert_eq!(health.state(), HealthState::Enabled);
    }

    #[test]
    fn manual_override_forces_state() {
        let mut health = StrategyHealth::new("s1");
        health.override_state(HealthState::Disabled);
        assert!(health.is_disabled());
    }
}
