//! Drives every registered strategy once per finalized bar (§4.3): skip if
//! health-disabled, call `on_position_update` when a position is open for
//! that strategy (never cooldown-gated) or `analyze` when flat and the
//! cooldown has elapsed, then broadcast any emitted [`Signal`] to listeners
//! in registration order.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use talus_data::MarketDataCache;
use talus_execution::tracker::PositionTracker;
use talus_markets::{Interval, Symbol};
use talus_trader::cooldown::Cooldown;
use talus_trader::signal::Signal;
use talus_trader::strategy::Strategy;
use tracing::warn;

/// Queried once per strategy per bar, before `analyze`/`on_position_update`
/// run (§4.3 step 1: "if the strategy is DISABLED, skip").
pub trait HealthGate: Send + Sync {
    fn is_disabled(&self, strategy_id: &str) -> bool;
}

/// No health monitoring configured (`monitor.health.enabled=false`):
/// nothing is ever disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHealthy;

impl HealthGate for AlwaysHealthy {
    fn is_disabled(&self, _strategy_id: &str) -> bool {
        false
    }
}

/// A side-effect callback notified, in registration order, of every signal
/// emitted. Exceptions are caught and logged (§4.3 step 5); they never
/// propagate to the evaluation loop.
pub type SignalListener = Arc<dyn Fn(&Signal) + Send + Sync>;

struct Registration {
    strategy: Mutex<Box<dyn Strategy + Send>>,
    symbol: Symbol,
    interval: Interval,
    cooldown: Mutex<Cooldown>,
}

/// Owns every registered [`Strategy`] instance and drives them from
/// finalized-bar events (§2, §4.3). One `Registration` per `(strategyId,
/// symbol, interval)`; strategies are evaluated sequentially, never
/// concurrently, matching the single-threaded-per-symbol contract strategy
/// authors rely on.
#[derive(Default)]
pub struct StrategyEvaluator {
    registrations: RwLock<Vec<Registration>>,
    listeners: RwLock<Vec<SignalListener>>,
}

impl std::fmt::Debug for StrategyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEvaluator")
            .field("registered", &self.registrations.read().len())
            .finish_non_exhaustive()
    }
}

impl StrategyEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy with its entry cooldown, in bars. Cooldown starts
    /// inactive (§4.2: a freshly registered strategy may enter immediately).
    pub fn register(&self, strategy: Box<dyn Strategy + Send>, cooldown_bars: u32) {
        let symbol = strategy.symbol().clone();
        let interval = strategy.interval();
        self.registrations.write().push(Registration {
            strategy: Mutex::new(strategy),
            symbol,
            interval,
            cooldown: Mutex::new(Cooldown::new(cooldown_bars)),
        });
    }

    pub fn add_signal_listener(&self, listener: SignalListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, signal: &Signal) {
        for listener in self.listeners.read().iter() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(signal)));
            if outcome.is_err() {
                warn!(strategy_id = %signal.strategy_id, "signal listener panicked, continuing");
            }
        }
    }

    /// The §4.3 per-finalized-bar cycle for every registration matching
    /// `(symbol, interval)`. Returns the signals emitted, in evaluation
    /// order, for the caller to route through `RiskGate` and
    /// `OrderExecutor`; listeners have already been notified of each.
    pub fn on_finalized_bar(
        &self,
        symbol: &Symbol,
        interval: Interval,
        cache: &MarketDataCache,
        tracker: &PositionTracker,
        health: &dyn HealthGate,
    ) -> Vec<Signal> {
        let registrations = self.registrations.read();
        let mut signals = Vec::new();

        for registration in registrations.iter().filter(|r| &r.symbol == symbol && r.interval == interval) {
            let mut strategy = registration.strategy.lock();
            let strategy_id = strategy.strategy_id().to_string();

            if health.is_disabled(&strategy_id) {
                continue;
            }

            let bars = cache.snapshot(symbol, interval);
            let Some(current) = bars.last() else { continue };
            registration.cooldown.lock().on_bar(current.open_time);

            let emitted = match tracker.tracked_position(symbol) {
                Some(position) if position.strategy_id == strategy_id => {
                    strategy.on_position_update(&position, current, &bars)
                }
                Some(_) => None,
                None => {
                    let mut cooldown = registration.cooldown.lock();
                    if cooldown.is_active() {
                        None
                    } else {
                        let signal = strategy.analyze(&bars);
                        if signal.is_some() {
                            cooldown.record_entry();
                        }
                        signal
                    }
                }
            };

            if let Some(signal) = emitted {
                self.notify(&signal);
                signals.push(signal);
            }
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use talus_data::Bar;
    use talus_execution::Position;

    struct AlwaysEntersOnce {
        symbol: Symbol,
        fired: bool,
    }

    impl Strategy for AlwaysEntersOnce {
        fn strategy_id(&self) -> &str {
            "test-strategy"
        }

        fn symbol(&self) -> &Symbol {
            &self.symbol
        }

        fn interval(&self) -> Interval {
            Interval::M5
        }

        fn analyze(&mut self, _bars: &[Bar]) -> Option<Signal> {
            if self.fired {
                return None;
            }
            self.fired = true;
            Some(Signal::entry(
                "test-strategy",
                self.symbol.clone(),
                talus_trader::signal::SignalType::EntryLong,
                Decimal::ONE,
                Decimal::ONE,
                Decimal::ONE,
                None,
                "test",
                Default::default(),
            ))
        }

        fn on_position_update(&mut self, _position: &Position, _current_bar: &Bar, _bars: &[Bar]) -> Option<Signal> {
            None
        }
    }

    #[test]
    fn cooldown_blocks_second_entry_within_window() {
        let evaluator = StrategyEvaluator::new();
        evaluator.register(Box::new(AlwaysEntersOnce { symbol: Symbol::new("BTC"), fired: false }), 10);

        let cache = MarketDataCache::new();
        let tracker = PositionTracker::default_with_fallback();
        let symbol = Symbol::new("BTC");

        let bar = |open_time: chrono::DateTime<Utc>| {
            Bar::new(symbol.clone(), Interval::M5, open_time, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, 1)
                .unwrap()
        };
        let t0 = Utc::now();
        cache.append_or_update(bar(t0)).unwrap();

        let signals = evaluator.on_finalized_bar(&symbol, Interval::M5, &cache, &tracker, &AlwaysHealthy);
        assert_eq!(signals.len(), 1);

        cache.append_or_update(bar(t0 + chrono::Duration::minutes(5))).unwrap();
        let signals = evaluator.on_finalized_bar(&symbol, Interval::M5, &cache, &tracker, &AlwaysHealthy);
        assert!(signals.is_empty(), "strategy already fired once, analyze should not re-enter");
    }

    #[test]
    fn disabled_health_skips_evaluation_entirely() {
        struct AlwaysDisabled;
        impl HealthGate for AlwaysDisabled {
            fn is_disabled(&self, _strategy_id: &str) -> bool {
                true
            }
        }

        let evaluator = StrategyEvaluator::new();
        evaluator.register(Box::new(AlwaysEntersOnce { symbol: Symbol::new("BTC"), fired: false }), 0);

        let cache = MarketDataCache::new();
        let tracker = PositionTracker::default_with_fallback();
        let symbol = Symbol::new("BTC");
        cache
            .append_or_update(
                Bar::new(symbol.clone(), Interval::M5, Utc::now(), Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, 1)
                    .unwrap(),
            )
            .unwrap();

        let signals = evaluator.on_finalized_bar(&symbol, Interval::M5, &cache, &tracker, &AlwaysDisabled);
        assert!(signals.is_empty());
    }

    #[test]
    fn signal_listener_is_notified_in_registration_order() {
        let evaluator = StrategyEvaluator::new();
        evaluator.register(Box::new(AlwaysEntersOnce { symbol: Symbol::new("BTC"), fired: false }), 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let sink = calls.clone();
        evaluator.add_signal_listener(Arc::new(move |_signal: &Signal| {
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        let cache = MarketDataCache::new();
        let tracker = PositionTracker::default_with_fallback();
        let symbol = Symbol::new("BTC");
        cache
            .append_or_update(
                Bar::new(symbol.clone(), Interval::M5, Utc::now(), Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, Decimal::ONE, 1)
                    .unwrap(),
            )
            .unwrap();

        evaluator.on_finalized_bar(&symbol, Interval::M5, &cache, &tracker, &AlwaysHealthy);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
