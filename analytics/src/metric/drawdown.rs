//! Peak-to-trough drawdown tracking (§4.8 "max drawdown %").

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_markets::decimal::checked_div_or_zero;

/// One completed drawdown episode: the fractional decline from `peak` to
/// `trough`, closed out once equity recovers back above `peak`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    pub value: Decimal,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

/// Tracks a running equity peak and the worst drawdown below it, emitting a
/// [`Drawdown`] each time equity recovers above the prior peak.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownGenerator {
    peak: Decimal,
    peak_time: DateTime<Utc>,
    trough: Decimal,
    trough_time: DateTime<Utc>,
    in_drawdown: bool,
}

impl DrawdownGenerator {
    pub fn init(starting_equity: Decimal, time: DateTime<Utc>) -> Self {
        DrawdownGenerator {
            peak: starting_equity,
            peak_time: time,
            trough: starting_equity,
            trough_time: time,
            in_drawdown: false,
        }
    }

    /// Feed the next equity mark. Returns a completed [`Drawdown`] the moment
    /// equity recovers back above the peak that started the episode.
    pub fn update(&mut self, equity: Decimal, time: DateTime<Utc>) -> Option<Drawdown> {
        if equity >= self.peak {
            let completed = self.in_drawdown.then(|| Drawdown {
                value: checked_div_or_zero(self.peak - self.trough, self.peak),
                time_start: self.peak_time,
                time_end: time,
            });

            self.peak = equity;
            self.peak_time = time;
            self.trough = equity;
            self.trough_time = time;
            self.in_drawdown = false;
            return completed;
        }

        self.in_drawdown = true;
        if equity < self.trough {
            self.trough = equity;
            self.trough_time = time;
        }
        None
    }

    /// Current drawdown fraction below the running peak, whether or not the
    /// episode has closed out yet.
    pub fn current(&self) -> Decimal {
        checked_div_or_zero(self.peak - self.trough, self.peak)
    }
}

/// The single worst peak-to-trough decline over an equity curve, as a
/// fraction of the peak at the time (§4.8's "max drawdown %" is this × 100).
pub fn max_drawdown(equity_curve: &[(DateTime<Utc>, Decimal)]) -> Decimal {
    let Some((_, first)) = equity_curve.first() else {
        return Decimal::ZERO;
    };

    let mut generator = DrawdownGenerator::init(*first, equity_curve[0].0);
    let mut worst = Decimal::ZERO;

    for (time, equity) in equity_curve.iter().skip(1) {
        generator.update(*equity, *time);
        worst = worst.max(generator.current());
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn generator_emits_drawdown_on_recovery() {
        let t0 = DateTime::<Utc>::MIN_UTC;
        let mut generator = DrawdownGenerator::init(dec!(100), t0);
        assert_eq!(generator.update(dec!(90), t0 + chrono::TimeDelta::days(1)), None);

        let drawdown = generator
            .update(dec!(120), t0 + chrono::TimeDelta::days(2))
            .unwrap();
        assert_eq!(drawdown.value, dec!(0.1));
    }

    #[test]
    fn max_drawdown_finds_worst_episode_even_if_unclosed() {
        let t0 = DateTime::<Utc>::MIN_UTC;
        let curve = vec![
            (t0, dec!(100)),
            (t0 + chrono::TimeDelta::days(1), dec!(150)),
            (t0 + chrono::TimeDelta::days(2), dec!(90)),
            (t0 + chrono::TimeDelta::days(3), dec!(120)),
        ];
        // peak 150 -> trough 90 = 40% drawdown, never fully recovers above 150
        assert_eq!(max_drawdown(&curve), dec!(0.4));
    }

    #[test]
    fn empty_curve_has_no_drawdown() {
        assert_eq!(max_drawdown(&[]), Decimal::ZERO);
    }
}
