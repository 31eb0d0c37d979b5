use rust_decimal::Decimal;
use std::collections::HashMap;
use talus_execution::ExitReason;
use talus_markets::{OrderSide, Symbol};

/// What a [`Signal`] asks the risk gate to do (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
}

impl SignalType {
    pub fn is_entry(self) -> bool {
        matches!(self, SignalType::EntryLong | SignalType::EntryShort)
    }

    pub fn side(self) -> OrderSide {
        match self {
            SignalType::EntryLong | SignalType::ExitShort => OrderSide::Buy,
            SignalType::EntryShort | SignalType::ExitLong => OrderSide::Sell,
        }
    }
}

/// A strategy's request to open or close a position, handed to `RiskGate`
/// for sizing/validation (§3). Transient — never persisted as-is.
#[derive(Debug, Clone)]
pub struct Signal {
    pub strategy_id: String,
    pub symbol: Symbol,
    pub signal_type: SignalType,
    pub side: OrderSide,
    pub price: Decimal,
    /// Zero means "let `RiskGate` size this signal"; a positive value is an
    /// explicit strategy-chosen quantity.
    pub qty: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub reason: String,
    /// Free-form diagnostics (e.g. `atr`, `upper`, `lower`) carried through
    /// to logs and backtest reports; never interpreted by the risk gate.
    pub metrics: HashMap<String, Decimal>,
    pub exit_reason: Option<ExitReason>,
    /// Hints a maker fee tier in backtest fee modeling; ignored live.
    pub maker: bool,
}

impl Signal {
    /// An entry signal. Panics-free construction clamps an invalid
    /// non-positive `stop_loss` up to the entry price's smallest representable
    /// increment is *not* attempted here — callers must supply a real ATR-derived
    /// stop; `RiskGate` rejects signals that don't (§3 invariant: "entries must
    /// set stopLoss > 0").
    #[allow(clippy::too_many_arguments)]
    pub fn entry(
        strategy_id: impl Into<String>,
        symbol: Symbol,
        signal_type: SignalType,
        price: Decimal,
        qty: Decimal,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        reason: impl Into<String>,
        metrics: HashMap<String, Decimal>,
    ) -> Self {
        debug_assert!(signal_type.is_entry());
        Signal {
            strategy_id: strategy_id.into(),
            symbol,
            side: signal_type.side(),
            signal_type,
            price,
            qty,
            stop_loss,
            take_profit,
            reason: reason.into(),
            metrics,
            exit_reason: None,
            maker: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn exit(
        strategy_id: impl Into<String>,
        symbol: Symbol,
        signal_type: SignalType,
        price: Decimal,
        qty: Decimal,
        reason: impl Into<String>,
        exit_reason: ExitReason,
    ) -> Self {
        debug_assert!(!signal_type.is_entry());
        Signal {
            strategy_id: strategy_id.into(),
            symbol,
            side: signal_type.side(),
            signal_type,
            price,
            qty,
            stop_loss: Decimal::ZERO,
            take_profit: None,
            reason: reason.into(),
            metrics: HashMap::new(),
            exit_reason: Some(exit_reason),
            maker: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_signal_carries_the_requested_side() {
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(49000),
            None,
            "breakout above upper channel",
            HashMap::new(),
        );
        assert_eq!(signal.side, OrderSide::Buy);
        assert!(signal.signal_type.is_entry());
    }

    #[test]
    fn exit_signal_carries_an_exit_reason() {
        let signal = Signal::exit(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::ExitLong,
            dec!(51000),
            dec!(0.1),
            "trailing stop hit",
            ExitReason::TrailingStop,
        );
        assert_eq!(signal.exit_reason, Some(ExitReason::TrailingStop));
        assert_eq!(signal.side, OrderSide::Sell);
    }
}
