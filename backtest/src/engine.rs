//! Deterministic bar-by-bar replay of the live `Strategy` interface (§4.8).
//! One bar at a time, forward chronologically: apply the local hard stop,
//! offer the strategy a chance to manage its open position, offer it a
//! chance to enter when flat, then mark the equity curve to the bar's
//! close. Given the same `(bars, strategy, settings)` triple, two runs
//! produce byte-identical `ClosedTrade` sequences (testable property 8) —
//! nothing in this module reads wall-clock time or randomness.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use talus_analytics::report::{self, BacktestReport};
use talus_data::Bar;
use talus_execution::trade::{ClosedTrade, ExitReason};
use talus_execution::Position;
use talus_integration::settings::BacktestSettings;
use talus_markets::decimal::{checked_div_or_zero, round_step_down};
use talus_markets::{InstrumentSpec, OrderSide, Side, Symbol};
use talus_trader::signal::{Signal, SignalType};
use talus_trader::strategy::{BacktestTradeListener, EquityAware, Strategy};

use crate::position::BacktestPosition;

/// Fraction of cash balance a single entry may use, after which the
/// strategy's requested size is capped (§4.8 "Quantity cap").
const MAX_BALANCE_FRACTION: Decimal = dec!(0.95);

fn position_side_for(signal_type: SignalType) -> Side {
    match signal_type {
        SignalType::EntryLong | SignalType::ExitLong => Side::Long,
        SignalType::EntryShort | SignalType::ExitShort => Side::Short,
    }
}

fn fee_rate(settings: &BacktestSettings, maker: bool) -> Decimal {
    if maker { settings.maker_fee } else { settings.taker_fee }
}

/// Applies slippage (skipped for a `maker` fill) plus a symmetric `spread/2`
/// cost, both expressed as a fraction of price, in the direction that makes
/// the fill worse for the trader (§4.8 "Entry fill price ... Backtest
/// additionally applies a symmetric spread/2 as part of cost").
fn fill_price_with_cost(raw_price: Decimal, order_side: OrderSide, maker: bool, settings: &BacktestSettings) -> Decimal {
    let mut price = raw_price;
    if !maker {
        price = match order_side {
            OrderSide::Buy => price * (Decimal::ONE + settings.slippage),
            OrderSide::Sell => price * (Decimal::ONE - settings.slippage),
        };
    }
    let half_spread = settings.spread / Decimal::TWO;
    match order_side {
        OrderSide::Buy => price * (Decimal::ONE + half_spread),
        OrderSide::Sell => price * (Decimal::ONE - half_spread),
    }
}

/// Replays one `(symbol, interval)` bar series against one strategy
/// instance. A fresh `BacktestEngine` corresponds to one backtest run;
/// construct a new one per run rather than reusing an instance.
#[derive(Debug)]
pub struct BacktestEngine {
    settings: BacktestSettings,
    instrument: InstrumentSpec,
    realized_equity: Decimal,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    closed_trades: Vec<ClosedTrade>,
    position: Option<BacktestPosition>,
}

impl BacktestEngine {
    pub fn new(settings: BacktestSettings, instrument: InstrumentSpec) -> Self {
        let initial_capital = settings.initial_capital;
        BacktestEngine {
            settings,
            instrument,
            realized_equity: initial_capital,
            equity_curve: Vec::new(),
            closed_trades: Vec::new(),
            position: None,
        }
    }

    /// Runs the full bar series to completion, consuming `self`, and
    /// returns the resulting [`BacktestReport`] alongside every
    /// [`ClosedTrade`] produced, in close order (for `logs/backtest-trades.csv`,
    /// §6 persisted state layout).
    pub fn run<S>(mut self, strategy: &mut S, bars: &[Bar]) -> (BacktestReport, Vec<ClosedTrade>)
    where
        S: Strategy + EquityAware + BacktestTradeListener,
    {
        let initial_capital = self.settings.initial_capital;
        if let Some(first) = bars.first() {
            self.equity_curve.push((first.open_time, initial_capital));
        }

        for i in 0..bars.len() {
            let window = &bars[..=i];
            let current = &bars[i];

            strategy.update_equity(self.mark_to_market(current.close));

            if let Some(signal) = self.local_stop_signal(current) {
                self.apply_signal(strategy, &signal, current.close_time);
            }

            if let Some(position) = self.position.as_ref().map(|p| p.position.clone()) {
                if let Some(signal) = strategy.on_position_update(&position, current, window) {
                    self.apply_signal(strategy, &signal, current.close_time);
                }
            }

            if self.position.is_none() {
                if let Some(signal) = strategy.analyze(window) {
                    self.apply_signal(strategy, &signal, current.close_time);
                }
            }

            let equity_now = self.mark_to_market(current.close);
            self.equity_curve.push((current.close_time, equity_now));
        }

        if let Some(last) = bars.last() {
            self.force_close_remaining(strategy, last);
        }

        let report = report::generate(initial_capital, self.equity_curve.clone(), &self.closed_trades);
        (report, self.closed_trades)
    }

    /// Equity if every open position were marked at `price` right now:
    /// realized cash plus unrealized PnL. Unrealized PnL ignores the open
    /// position's entry fee, which is charged only once the slice actually
    /// closes.
    fn mark_to_market(&self, price: Decimal) -> Decimal {
        let unrealized = self.position.as_ref().map(|p| p.position.unrealized_pnl(price)).unwrap_or(Decimal::ZERO);
        self.realized_equity + unrealized
    }

    /// The hard protective stop armed at entry (§4.8 step b: "apply stop
    /// checks on open positions using bar low/high"), distinct from any
    /// trailing exit the strategy itself emits from `on_position_update`.
    fn local_stop_signal(&self, bar: &Bar) -> Option<Signal> {
        let position = &self.position.as_ref()?.position;
        let breached = match position.side {
            Side::Long => bar.low <= position.stop_loss,
            Side::Short => bar.high >= position.stop_loss,
        };
        if !breached {
            return None;
        }
        let signal_type = match position.side {
            Side::Long => SignalType::ExitLong,
            Side::Short => SignalType::ExitShort,
        };
        Some(Signal::exit(
            position.strategy_id.clone(),
            position.symbol.clone(),
            signal_type,
            position.stop_loss,
            position.qty,
            "local stop breached",
            ExitReason::StopLoss,
        ))
    }

    fn apply_signal<L: BacktestTradeListener>(&mut self, listener: &mut L, signal: &Signal, now: DateTime<Utc>) {
        if signal.signal_type.is_entry() {
            if self.position.is_some() {
                return;
            }
            if let Some(position) = self.open_position(signal, now) {
                listener.on_position_opened(&position);
            }
        } else {
            let Some(matches_side) = self.position.as_ref().map(|p| p.position.side == position_side_for(signal.signal_type)) else {
                return;
            };
            if !matches_side {
                return;
            }
            let qty = signal.qty.min(self.position.as_ref().map(|p| p.position.qty).unwrap_or(Decimal::ZERO));
            if qty <= Decimal::ZERO {
                return;
            }
            let exit_reason = signal.exit_reason.unwrap_or(ExitReason::StrategyExit);
            let fill_price = fill_price_with_cost(signal.price, signal.side, signal.maker, &self.settings);
            let exit_fee = fill_price * qty * fee_rate(&self.settings, signal.maker);
            if let Some(trade) = self.close_slice(qty, fill_price, exit_fee, exit_reason, now) {
                listener.on_position_closed(&trade);
            }
        }
    }

    /// Sizes, caps, and opens a new position, or returns `None` if the
    /// signal rounds below the instrument's minimums (logged, dropped — the
    /// sim never aborts for one bad signal).
    fn open_position(&mut self, signal: &Signal, now: DateTime<Utc>) -> Option<Position> {
        if signal.qty <= Decimal::ZERO {
            tracing::debug!(strategy_id = %signal.strategy_id, "entry signal carries no quantity, skipping");
            return None;
        }

        let fill_price = fill_price_with_cost(signal.price, signal.side, signal.maker, &self.settings);
        let balance_cap = checked_div_or_zero(self.realized_equity * MAX_BALANCE_FRACTION, fill_price);
        let qty = round_step_down(signal.qty.min(balance_cap), self.instrument.qty_step);

        if qty < self.instrument.min_qty || !self.instrument.meets_min_notional(qty, fill_price) {
            tracing::warn!(strategy_id = %signal.strategy_id, %qty, "entry below instrument minimums, skipping");
            return None;
        }

        let entry_fee = fill_price * qty * fee_rate(&self.settings, signal.maker);
        let side = position_side_for(signal.signal_type);
        let position = Position::new(signal.symbol.clone(), side, fill_price, qty, signal.stop_loss, self.settings.leverage, signal.strategy_id.clone(), now);

        let snapshot = position.clone();
        self.position = Some(BacktestPosition::open(position, entry_fee));
        Some(snapshot)
    }

    fn close_slice(&mut self, qty: Decimal, exit_price: Decimal, exit_fee: Decimal, reason: ExitReason, now: DateTime<Utc>) -> Option<ClosedTrade> {
        let bt_position = self.position.as_mut()?;
        let trade = bt_position.close_slice(qty, exit_price, exit_fee, reason, now)?;
        self.realized_equity += trade.net_pnl();
        if bt_position.is_closed() {
            self.position = None;
        }
        self.closed_trades.push(trade.clone());
        Some(trade)
    }

    /// Closes whatever remains open at the final bar's close, with slippage
    /// (§4.8 "At the end, close any remaining positions at the last bar's
    /// close (with slippage)").
    fn force_close_remaining<L: BacktestTradeListener>(&mut self, listener: &mut L, last: &Bar) {
        let Some((qty, side)) = self.position.as_ref().map(|p| (p.position.qty, p.position.side)) else { return };
        let order_side = OrderSide::to_close(side);
        let fill_price = fill_price_with_cost(last.close, order_side, false, &self.settings);
        let exit_fee = fill_price * qty * fee_rate(&self.settings, false);
        if let Some(trade) = self.close_slice(qty, fill_price, exit_fee, ExitReason::ForceClose, last.close_time) {
            listener.on_position_closed(&trade);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use talus_execution::Position as Pos;
    use talus_markets::Interval;

    struct PartialTpStrategy {
        entered: bool,
        took_partial: bool,
        equity: Decimal,
    }

    impl Strategy for PartialTpStrategy {
        fn strategy_id(&self) -> &str {
            "partial-tp-test"
        }
        fn symbol(&self) -> &Symbol {
            static SYMBOL: std::sync::OnceLock<Symbol> = std::sync::OnceLock::new();
            SYMBOL.get_or_init(|| Symbol::new("BTC"))
        }
        fn interval(&self) -> Interval {
            Interval::M15
        }

        fn analyze(&mut self, bars: &[Bar]) -> Option<Signal> {
            if self.entered || bars.len() < 2 {
                return None;
            }
            self.entered = true;
            Some(Signal::entry(
                "partial-tp-test",
                Symbol::new("BTC"),
                SignalType::EntryLong,
                dec!(100),
                dec!(0.3),
                dec!(90),
                Some(dec!(101)),
                "test entry",
                Default::default(),
            ))
        }

        fn on_position_update(&mut self, position: &Pos, current_bar: &Bar, _bars: &[Bar]) -> Option<Signal> {
            if !self.took_partial && current_bar.high >= dec!(101) {
                self.took_partial = true;
                return Some(Signal::exit(
                    "partial-tp-test",
                    Symbol::new("BTC"),
                    SignalType::ExitLong,
                    dec!(101),
                    position.qty * dec!(0.3),
                    "take profit 1",
                    ExitReason::TakeProfit,
                ));
            }
            None
        }
    }

    impl EquityAware for PartialTpStrategy {
        fn update_equity(&mut self, equity: Decimal) {
            self.equity = equity;
        }
    }

    impl BacktestTradeListener for PartialTpStrategy {
        fn on_position_opened(&mut self, _position: &Pos) {}
        fn on_position_closed(&mut self, _trade: &talus_execution::trade::ClosedTrade) {}
    }

    fn bar(minute: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        let open_time = Utc.timestamp_opt(1_700_000_000 + minute * 900, 0).unwrap();
        Bar::new(Symbol::new("BTC"), Interval::M15, open_time, open, high, low, close, dec!(1), dec!(1), 1).unwrap()
    }

    fn instrument() -> InstrumentSpec {
        InstrumentSpec { symbol: Symbol::new("BTC"), qty_step: dec!(0.001), min_qty: dec!(0.001), min_notional: dec!(5), price_tick: dec!(0.1) }
    }

    fn zero_cost_settings() -> BacktestSettings {
        BacktestSettings {
            start_time: None,
            end_time: None,
            initial_capital: dec!(10000),
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::ZERO,
            slippage: Decimal::ZERO,
            spread: Decimal::ZERO,
            leverage: 1,
            limit_order_max_bars: 3,
            data_file: None,
        }
    }

    #[test]
    fn partial_take_profit_leaves_remainder_open_at_same_entry_price() {
        let bars = vec![bar(0, dec!(100), dec!(100), dec!(100), dec!(100)), bar(1, dec!(100), dec!(102), dec!(99), dec!(101))];

        let engine = BacktestEngine::new(zero_cost_settings(), instrument());
        let mut strategy = PartialTpStrategy { entered: false, took_partial: false, equity: Decimal::ZERO };
        let (report, _trades) = engine.run(&mut strategy, &bars);

        assert!(strategy.took_partial);
        assert_eq!(report.win_rate, dec!(1));
    }

    #[test]
    fn equity_curve_has_one_point_per_bar_plus_the_seed() {
        let bars = vec![bar(0, dec!(100), dec!(101), dec!(99), dec!(100)), bar(1, dec!(100), dec!(101), dec!(99), dec!(100))];
        let engine = BacktestEngine::new(zero_cost_settings(), instrument());
        let mut strategy = PartialTpStrategy { entered: true, took_partial: true, equity: Decimal::ZERO };
        let (report, _trades) = engine.run(&mut strategy, &bars);
        assert_eq!(report.equity_curve.len(), bars.len() + 1);
    }

    #[test]
    fn remaining_position_force_closes_at_final_close() {
        let bars = vec![bar(0, dec!(100), dec!(100), dec!(100), dec!(100)), bar(1, dec!(100), dec!(105), dec!(100), dec!(104))];
        let engine = BacktestEngine::new(zero_cost_settings(), instrument());
        let mut strategy = PartialTpStrategy { entered: false, took_partial: true, equity: Decimal::ZERO };
        let (report, _trades) = engine.run(&mut strategy, &bars);
        assert!(report.total_return_pct > Decimal::ZERO);
    }

    /// Testable property 8: identical `(BarSeries, StrategyConfig,
    /// BacktestConfig)` must produce byte-identical `ClosedTrade` sequences
    /// and identical final equity across runs.
    #[test]
    fn identical_inputs_produce_byte_identical_trade_sequences() {
        let bars = vec![
            bar(0, dec!(100), dec!(100), dec!(100), dec!(100)),
            bar(1, dec!(100), dec!(102), dec!(99), dec!(101)),
            bar(2, dec!(101), dec!(105), dec!(100), dec!(104)),
        ];

        let run = || {
            let engine = BacktestEngine::new(zero_cost_settings(), instrument());
            let mut strategy = PartialTpStrategy { entered: false, took_partial: false, equity: Decimal::ZERO };
            engine.run(&mut strategy, &bars)
        };

        let (report_a, trades_a) = run();
        let (report_b, trades_b) = run();

        assert_eq!(trades_a, trades_b);
        assert_eq!(report_a.equity_curve, report_b.equity_curve);
        assert_eq!(report_a.total_return_pct, report_b.total_return_pct);
    }
}
