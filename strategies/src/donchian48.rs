//! The canonical Donchian-48 breakout strategy (§4.2): a 15m-bar
//! trend-following system that enters on a 48-bar channel breakout, sizes
//! against a 48-bar ATR stop, and trails that stop for the life of the
//! position.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use talus_data::Bar;
use talus_execution::Position;
use talus_markets::decimal::{checked_div_or_zero, round_step_down};
use talus_markets::{Interval, Side, Symbol};
use talus_trader::strategy::{EquityAware, Strategy};
use talus_trader::signal::{Signal, SignalType};
use talus_execution::ExitReason;

use crate::indicators::{atr, donchian_lower, donchian_upper};

/// Tunables for one `Donchian48` instance. Defaults match §4.2's reference
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Donchian48Config {
    /// Lookback for the breakout channel (the "48" in Donchian-48).
    pub channel_period: usize,
    /// Lookback for the ATR used both as a volatility filter and as the
    /// stop/trailing-stop distance.
    pub atr_period: usize,
    /// Minimum `ATR / close` ratio required to take a signal; rejects
    /// breakouts in dead markets.
    pub min_atr_pct: Decimal,
    /// Stop distance and trailing-stop distance, expressed as a multiple of
    /// ATR.
    pub atr_stop_multiple: Decimal,
    /// Fraction of equity risked per trade when this strategy self-sizes.
    pub risk_per_trade: Decimal,
    pub qty_step: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
}

impl Default for Donchian48Config {
    fn default() -> Self {
        Donchian48Config {
            channel_period: 48,
            atr_period: 48,
            min_atr_pct: dec!(0.004),
            atr_stop_multiple: dec!(2),
            risk_per_trade: dec!(0.01),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
            min_notional: dec!(10),
        }
    }
}

/// The breakout strategy itself. One instance tracks exactly one open
/// position at a time (the evaluator never calls `analyze` while a position
/// is open, and never calls `on_position_update` while flat — §4.3).
#[derive(Debug, Clone)]
pub struct Donchian48 {
    strategy_id: String,
    symbol: Symbol,
    interval: Interval,
    config: Donchian48Config,
    equity: Decimal,
    open_position_since: Option<DateTime<Utc>>,
    trailing_stop: Decimal,
    trailing_extreme: Decimal,
}

impl Donchian48 {
    pub fn new(
        strategy_id: impl Into<String>,
        symbol: Symbol,
        interval: Interval,
        config: Donchian48Config,
    ) -> Self {
        Donchian48 {
            strategy_id: strategy_id.into(),
            symbol,
            interval,
            config,
            equity: Decimal::ZERO,
            open_position_since: None,
            trailing_stop: Decimal::ZERO,
            trailing_extreme: Decimal::ZERO,
        }
    }

    fn warmup_bars(&self) -> usize {
        self.config.channel_period + self.config.atr_period
    }

    /// Risk-based position size, rounded down to `qty_step`. Returns zero if
    /// the result would fall below `min_qty`/`min_notional` or equity is
    /// unknown — in either case `RiskGate` is left to size the entry instead
    /// (§4.4 step 5: "If signal carries a positive qty, use it; else size
    /// it").
    fn size_entry(&self, entry_price: Decimal, stop_price: Decimal) -> Decimal {
        if self.equity.is_sign_negative() || self.equity.is_zero() {
            return Decimal::ZERO;
        }
        let stop_distance = (entry_price - stop_price).abs();
        if stop_distance.is_zero() {
            return Decimal::ZERO;
        }
        let risk_amount = self.config.risk_per_trade * self.equity;
        let raw_qty = checked_div_or_zero(risk_amount, stop_distance);
        let qty = round_step_down(raw_qty, self.config.qty_step);
        if qty < self.config.min_qty || qty * entry_price < self.config.min_notional {
            return Decimal::ZERO;
        }
        qty
    }
}

impl Strategy for Donchian48 {
    fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn interval(&self) -> Interval {
        self.interval
    }

    fn analyze(&mut self, bars: &[Bar]) -> Option<Signal> {
        if bars.len() < self.warmup_bars() {
            return None;
        }

        let current = bars.last()?;
        let channel_window = &bars[bars.len() - 1 - self.config.channel_period..bars.len() - 1];
        let atr_window = &bars[bars.len() - 1 - self.config.atr_period - 1..bars.len() - 1];

        let upper = donchian_upper(channel_window);
        let lower = donchian_lower(channel_window);
        let atr_value = atr(atr_window);

        if checked_div_or_zero(atr_value, current.close) < self.config.min_atr_pct {
            return None;
        }

        let (signal_type, stop_price) = if current.high >= upper {
            (
                SignalType::EntryLong,
                current.open - self.config.atr_stop_multiple * atr_value,
            )
        } else if current.low <= lower {
            (
                SignalType::EntryShort,
                current.open + self.config.atr_stop_multiple * atr_value,
            )
        } else {
            return None;
        };

        // Fill price is the raw bar open; spread/slippage are applied
        // downstream (zero live, modeled by the backtest engine in
        // simulation — §4.8), so the strategy never double-counts cost.
        let entry_price = current.open;
        let qty = self.size_entry(entry_price, stop_price);

        let mut metrics = HashMap::new();
        metrics.insert("atr".to_string(), atr_value);
        metrics.insert("channel_upper".to_string(), upper);
        metrics.insert("channel_lower".to_string(), lower);

        Some(Signal::entry(
            self.strategy_id.clone(),
            self.symbol.clone(),
            signal_type,
            entry_price,
            qty,
            stop_price,
            None,
            "donchian-48 channel breakout",
            metrics,
        ))
    }

    fn on_position_update(
        &mut self,
        position: &Position,
        current_bar: &Bar,
        bars: &[Bar],
    ) -> Option<Signal> {
        if self.open_position_since != Some(position.opened_at) {
            self.open_position_since = Some(position.opened_at);
            self.trailing_stop = position.stop_loss;
            self.trailing_extreme = position.entry_price;
        }

        if bars.len() < self.config.atr_period + 1 {
            return None;
        }
        let atr_window = &bars[bars.len() - 1 - self.config.atr_period..];
        let atr_value = atr(atr_window);

        match position.side {
            Side::Long => {
                self.trailing_extreme = self.trailing_extreme.max(current_bar.high);
                let candidate = self.trailing_extreme - self.config.atr_stop_multiple * atr_value;
                self.trailing_stop = self.trailing_stop.max(candidate);

                if current_bar.low <= self.trailing_stop {
                    return Some(Signal::exit(
                        self.strategy_id.clone(),
                        self.symbol.clone(),
                        SignalType::ExitLong,
                        current_bar.close,
                        position.qty,
                        "trailing stop breached",
                        ExitReason::TrailingStop,
                    ));
                }
            }
            Side::Short => {
                self.trailing_extreme = self.trailing_extreme.min(current_bar.low);
                let candidate = self.trailing_extreme + self.config.atr_stop_multiple * atr_value;
                self.trailing_stop = self.trailing_stop.min(candidate);

                if current_bar.high >= self.trailing_stop {
                    return Some(Signal::exit(
                        self.strategy_id.clone(),
                        self.symbol.clone(),
                        SignalType::ExitShort,
                        current_bar.close,
                        position.qty,
                        "trailing stop breached",
                        ExitReason::TrailingStop,
                    ));
                }
            }
        }

        None
    }
}

impl EquityAware for Donchian48 {
    fn update_equity(&mut self, equity: Decimal) {
        self.equity = equity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(minute: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        let open_time = Utc.timestamp_opt(1_700_000_000 + minute * 900, 0).unwrap();
        Bar::new(
            Symbol::new("BTC"),
            Interval::M15,
            open_time,
            open,
            high,
            low,
            close,
            dec!(1),
            dec!(1),
            10,
        )
        .unwrap()
    }

    /// A flat run of quiet bars around `price`, long enough to clear warm-up.
    fn quiet_history(count: usize, price: Decimal) -> Vec<Bar> {
        (0..count as i64)
            .map(|i| bar_at(i, price, price + dec!(1), price - dec!(1), price))
            .collect()
    }

    fn strategy() -> Donchian48 {
        Donchian48::new(
            "donchian-48",
            Symbol::new("BTC"),
            Interval::M15,
            Donchian48Config::default(),
        )
    }

    #[test]
    fn rejects_before_warmup() {
        let mut strat = strategy();
        let bars = quiet_history(50, dec!(100));
        assert!(strat.analyze(&bars).is_none());
    }

    #[test]
    fn rejects_low_volatility_breakout() {
        let mut strat = strategy();
        let mut bars = quiet_history(96, dec!(100));
        // A 1-tick breakout in an otherwise dead-quiet market: ATR/close
        // stays far below the volatility floor.
        let last = bars.last_mut().unwrap();
        last.high = dec!(101.5);
        assert!(strat.analyze(&bars).is_none());
    }

    #[test]
    fn emits_long_entry_on_upper_channel_breakout() {
        let mut strat = strategy();
        let mut bars = quiet_history(96, dec!(100));
        for (i, bar) in bars.iter_mut().enumerate() {
            // Widen the range so ATR clears the volatility filter.
            bar.high += Decimal::from(i % 3);
            bar.low -= Decimal::from(i % 3);
        }
        let last = bars.last_mut().unwrap();
        last.high = dec!(130);
        last.open = dec!(105);

        let signal = strat.analyze(&bars).expect("expected a breakout entry");
        assert_eq!(signal.signal_type, SignalType::EntryLong);
        assert!(signal.stop_loss < signal.price);
    }

    #[test]
    fn self_sizes_when_equity_is_known() {
        let mut strat = strategy();
        strat.update_equity(dec!(10000));
        let entry_price = dec!(100);
        let stop_price = dec!(95);
        let qty = strat.size_entry(entry_price, stop_price);
        // riskAmount = 0.01 * 10000 = 100; qty = 100 / 5 = 20
        assert_eq!(qty, dec!(20));
    }

    #[test]
    fn defers_sizing_to_risk_gate_when_equity_unknown() {
        let strat = strategy();
        assert_eq!(strat.size_entry(dec!(100), dec!(95)), Decimal::ZERO);
    }

    #[test]
    fn trailing_stop_tightens_and_breaches_on_pullback() {
        let mut strat = strategy();
        let position = Position::new(
            Symbol::new("BTC"),
            Side::Long,
            dec!(100),
            dec!(1),
            dec!(90),
            1,
            "donchian-48".to_string(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        );

        let mut bars = quiet_history(49, dec!(100));
        let rally = bar_at(49, dec!(100), dec!(120), dec!(99), dec!(119));
        bars.push(rally.clone());
        let update = strat.on_position_update(&position, &rally, &bars);
        assert!(update.is_none());
        assert!(strat.trailing_stop > dec!(90));

        let pullback = bar_at(50, dec!(118), dec!(118), dec!(90), dec!(95));
        bars.push(pullback.clone());
        let exit = strat
            .on_position_update(&position, &pullback, &bars)
            .expect("trailing stop should breach on the pullback");
        assert_eq!(exit.signal_type, SignalType::ExitLong);
        assert_eq!(exit.exit_reason, Some(ExitReason::TrailingStop));
    }
}
