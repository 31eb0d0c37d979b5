//! The pluggable strategy contract (§4.2). A strategy is stateful per
//! position — trailing highs, take-profit flags — so both operations take
//! `&mut self`; the evaluator drives one instance per `(strategyId, symbol,
//! interval)` and never calls it concurrently (§5: "strategies are not
//! required to be reentrant").

use rust_decimal::Decimal;
use talus_data::Bar;
use talus_execution::{ClosedTrade, Position};
use talus_markets::{Interval, Symbol};

use crate::signal::Signal;

/// A pluggable entry/exit signal generator (§4.2 "Contract").
pub trait Strategy {
    fn strategy_id(&self) -> &str;
    fn symbol(&self) -> &Symbol;
    fn interval(&self) -> Interval;

    /// Called when flat. `bars` is the finalized history up to and including
    /// the current bar, oldest first.
    fn analyze(&mut self, bars: &[Bar]) -> Option<Signal>;

    /// Called when a position is open for this strategy's symbol. Never
    /// cooldown-gated (§4.2: "Exits and position management are never
    /// cooldown-gated").
    fn on_position_update(&mut self, position: &Position, current_bar: &Bar, bars: &[Bar]) -> Option<Signal>;
}

/// Optional capability: a strategy that sizes its own entries needs the
/// current account equity pushed to it (§4.2 "EquityAware.update_equity(eq)
/// for dynamic sizing").
pub trait EquityAware {
    fn update_equity(&mut self, equity: Decimal);
}

/// Optional capability: in-strategy bookkeeping hooks fired by
/// `BacktestEngine` around position lifecycle events (§4.2
/// "BacktestTradeListener.on_position_opened/closed for in-strategy
/// bookkeeping in backtest"). Live trading does not call these — position
/// lifecycle there is owned by `PositionTracker`.
pub trait BacktestTradeListener {
    fn on_position_opened(&mut self, position: &Position);
    fn on_position_closed(&mut self, trade: &ClosedTrade);
}
