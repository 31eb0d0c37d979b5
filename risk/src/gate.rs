//! `RiskGate`: the authoritative policy layer every [`Signal`] must pass
//! through before it becomes an [`Order`] (§4.4). Entries run the full
//! policy chain (trading switch, consecutive losses, drawdown, position
//! count, sizing, balance, stop distance); exits bypass the chain and are
//! only clamped to the matching position's quantity and marked
//! `reduce_only`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use talus_execution::{Order, OrderType, Position};
use talus_markets::decimal::checked_div_or_zero;
use talus_markets::{ExchangeId, InstrumentSpec, OrderSide, Symbol};
use talus_trader::{Signal, SignalType};

/// Why `RiskGate` refused a signal. The `Display` text is what the spec's
/// scenarios assert against (e.g. S2 expects the literal substring
/// `"drawdown"`).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskRejection {
    #[error("trading is disabled")]
    TradingDisabled,
    #[error("strategy {strategy_id} has {count} consecutive losses (limit {limit})")]
    ConsecutiveLosses {
        strategy_id: String,
        count: u32,
        limit: u32,
    },
    #[error("strategy {strategy_id} drawdown {drawdown_pct}% exceeds limit {limit_pct}%")]
    Drawdown {
        strategy_id: String,
        drawdown_pct: Decimal,
        limit_pct: Decimal,
    },
    #[error("symbol {symbol} already has {count} open position(s), limit {limit}")]
    TooManyPositions {
        symbol: Symbol,
        count: u32,
        limit: u32,
    },
    #[error("sized quantity for {symbol} is zero after rounding/min-notional checks")]
    ZeroSize { symbol: Symbol },
    #[error("required margin exceeds available balance ({required} > {available})")]
    InsufficientBalance { required: Decimal, available: Decimal },
    #[error("stop distance {distance_pct}% exceeds max {limit_pct}%")]
    StopTooWide {
        distance_pct: Decimal,
        limit_pct: Decimal,
    },
    #[error("entry signal has no positive stop-loss")]
    MissingStopLoss,
    #[error("exit signal for {symbol} has no matching open position")]
    NoMatchingPosition { symbol: Symbol },
    #[error("instrument spec for {symbol} is not configured")]
    UnknownInstrument { symbol: Symbol },
}

/// §6 risk.* settings, resolved once from `Settings` and held for the life
/// of the gate.
#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub per_trade: Decimal,
    pub max_drawdown: Decimal,
    pub max_consecutive_losses: u32,
    pub max_position_ratio: Decimal,
    pub max_stop_loss_percent: Decimal,
    pub max_positions_per_symbol: u32,
    pub margin_buffer: Decimal,
}

#[derive(Debug, Clone, Default)]
struct StrategyRiskState {
    consecutive_losses: u32,
    peak_equity: Decimal,
}

/// Account figures an entry's balance check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct AccountSnapshot {
    pub total_equity: Decimal,
    pub available_equity: Decimal,
}

/// The policy gate itself (§4.4). One instance serves every strategy/symbol
/// in the pipeline; per-strategy state (consecutive losses, peak equity) is
/// keyed by `strategy_id`.
#[derive(Debug)]
pub struct RiskGate {
    settings: RiskSettings,
    exchange: ExchangeId,
    default_order_type: OrderType,
    instruments: HashMap<Symbol, InstrumentSpec>,
    trading_enabled: AtomicBool,
    strategy_state: RwLock<HashMap<String, StrategyRiskState>>,
}

impl RiskGate {
    pub fn new(
        settings: RiskSettings,
        exchange: ExchangeId,
        default_order_type: OrderType,
        instruments: HashMap<Symbol, InstrumentSpec>,
    ) -> Self {
        RiskGate {
            settings,
            exchange,
            default_order_type,
            instruments,
            trading_enabled: AtomicBool::new(true),
            strategy_state: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_trading_enabled(&self, enabled: bool) {
        self.trading_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn trading_enabled(&self) -> bool {
        self.trading_enabled.load(Ordering::SeqCst)
    }

    /// Updates the strategy's peak equity watermark from an observed
    /// account equity figure (§4.4: "Peak equity per strategy updates on
    /// observed equity"). Call this on every account snapshot, before
    /// `validate_and_create_order` evaluates drawdown.
    pub fn observe_equity(&self, strategy_id: &str, equity: Decimal) {
        let mut state = self.strategy_state.write();
        let entry = state.entry(strategy_id.to_string()).or_default();
        if equity > entry.peak_equity {
            entry.peak_equity = equity;
        }
    }

    /// §4.4 "Trade outcome feedback": resets the consecutive-loss counter on
    /// a win, increments it on a loss. `pnl` is accepted for symmetry with
    /// the spec's signature but the gate only needs the win/loss flag.
    pub fn record_trade_result(&self, strategy_id: &str, is_win: bool, _pnl: Decimal) {
        let mut state = self.strategy_state.write();
        let entry = state.entry(strategy_id.to_string()).or_default();
        if is_win {
            entry.consecutive_losses = 0;
        } else {
            entry.consecutive_losses += 1;
        }
    }

    pub fn consecutive_losses(&self, strategy_id: &str) -> u32 {
        self.strategy_state
            .read()
            .get(strategy_id)
            .map(|s| s.consecutive_losses)
            .unwrap_or(0)
    }

    /// The sole entry point every [`Signal`] passes through (§4.4). Entries
    /// run the full policy chain; exits are only clamped and flagged
    /// `reduce_only`.
    pub fn validate_and_create_order(
        &self,
        signal: &Signal,
        existing_positions: &[Position],
        account: AccountSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Order, RiskRejection> {
        if signal.signal_type.is_entry() {
            self.validate_entry(signal, existing_positions, account, now)
        } else {
            self.validate_exit(signal, existing_positions, now)
        }
    }

    fn validate_entry(
        &self,
        signal: &Signal,
        existing_positions: &[Position],
        account: AccountSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Order, RiskRejection> {
        // 1. Global trading switch.
        if !self.trading_enabled() {
            return Err(RiskRejection::TradingDisabled);
        }

        // 2. Consecutive-loss counter.
        let consecutive_losses = self.consecutive_losses(&signal.strategy_id);
        if consecutive_losses >= self.settings.max_consecutive_losses {
            return Err(RiskRejection::ConsecutiveLosses {
                strategy_id: signal.strategy_id.clone(),
                count: consecutive_losses,
                limit: self.settings.max_consecutive_losses,
            });
        }

        // 3. Drawdown from per-strategy peak equity.
        let peak_equity = self
            .strategy_state
            .read()
            .get(&signal.strategy_id)
            .map(|s| s.peak_equity)
            .unwrap_or(account.total_equity);
        if peak_equity.is_sign_positive() && !peak_equity.is_zero() {
            let drawdown = checked_div_or_zero(peak_equity - account.total_equity, peak_equity)
                * Decimal::from(100);
            if drawdown >= self.settings.max_drawdown * Decimal::from(100) {
                return Err(RiskRejection::Drawdown {
                    strategy_id: signal.strategy_id.clone(),
                    drawdown_pct: drawdown,
                    limit_pct: self.settings.max_drawdown * Decimal::from(100),
                });
            }
        }

        // 4. Position count per symbol.
        let open_count = existing_positions
            .iter()
            .filter(|p| p.symbol == signal.symbol && !p.is_closed())
            .count() as u32;
        if open_count >= self.settings.max_positions_per_symbol {
            return Err(RiskRejection::TooManyPositions {
                symbol: signal.symbol.clone(),
                count: open_count,
                limit: self.settings.max_positions_per_symbol,
            });
        }

        // Mandatory stop, validated before sizing divides by its distance.
        if signal.stop_loss <= Decimal::ZERO {
            return Err(RiskRejection::MissingStopLoss);
        }

        let spec = self
            .instruments
            .get(&signal.symbol)
            .ok_or_else(|| RiskRejection::UnknownInstrument {
                symbol: signal.symbol.clone(),
            })?;

        // 5. Size the order.
        let qty = if signal.qty.is_sign_positive() && !signal.qty.is_zero() {
            spec.normalize_quantity(signal.qty)
                .map_err(|_| RiskRejection::ZeroSize {
                    symbol: signal.symbol.clone(),
                })?
        } else {
            self.size_entry(signal, spec, account)?
        };

        // 7 (validated ahead of the balance check since it needs no size).
        let stop_distance_pct =
            checked_div_or_zero((signal.price - signal.stop_loss).abs(), signal.price)
                * Decimal::from(100);
        if stop_distance_pct > self.settings.max_stop_loss_percent {
            return Err(RiskRejection::StopTooWide {
                distance_pct: stop_distance_pct,
                limit_pct: self.settings.max_stop_loss_percent,
            });
        }

        // 6. Balance check: notional / leverage * marginBuffer <= available.
        let leverage = Decimal::ONE; // one-way, cross-margin default; leverage is set at venue level (§6 live.leverage)
        let notional = qty * signal.price;
        let required_margin = checked_div_or_zero(notional, leverage) * self.settings.margin_buffer;
        if required_margin > account.available_equity {
            return Err(RiskRejection::InsufficientBalance {
                required: required_margin,
                available: account.available_equity,
            });
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        let client_order_id = format!("e_{}", order_id.replace('-', "").chars().take(20).collect::<String>());

        Order::new_entry(
            order_id,
            self.exchange,
            signal.symbol.clone(),
            signal.side,
            self.default_order_type,
            qty,
            None,
            signal.stop_loss,
            signal.take_profit,
            signal.strategy_id.clone(),
            client_order_id,
            now,
        )
        .map_err(|_| RiskRejection::ZeroSize {
            symbol: signal.symbol.clone(),
        })
    }

    /// §4.4 step 5 "Else": `sizing balance = min(total, available)`;
    /// `riskAmount = balance · riskPerTrade`; `qty = riskAmount / |entry −
    /// stop|`; capped at `maxPositionRatio · balance / entry`; rounded to
    /// the instrument's step.
    fn size_entry(
        &self,
        signal: &Signal,
        spec: &InstrumentSpec,
        account: AccountSnapshot,
    ) -> Result<Decimal, RiskRejection> {
        let sizing_balance = account.total_equity.min(account.available_equity);
        let risk_amount = sizing_balance * self.settings.per_trade;
        let stop_distance = (signal.price - signal.stop_loss).abs();
        let raw_qty = checked_div_or_zero(risk_amount, stop_distance);

        let cap_qty = checked_div_or_zero(
            self.settings.max_position_ratio * sizing_balance,
            signal.price,
        );
        let capped = raw_qty.min(cap_qty);

        let qty = spec
            .normalize_quantity(capped)
            .map_err(|_| RiskRejection::ZeroSize {
                symbol: signal.symbol.clone(),
            })?;

        if !spec.meets_min_notional(qty, signal.price) {
            return Err(RiskRejection::ZeroSize {
                symbol: signal.symbol.clone(),
            });
        }

        Ok(qty)
    }

    /// Exits bypass steps 2–7: they only require a matching-side open
    /// position and clamp quantity to it (§4.4 "Exits bypass steps 2–7 but
    /// require that a matching-side, non-closed position exists... quantity
    /// is clamped to the position's quantity").
    fn validate_exit(
        &self,
        signal: &Signal,
        existing_positions: &[Position],
        now: DateTime<Utc>,
    ) -> Result<Order, RiskRejection> {
        let expected_side = match signal.signal_type {
            SignalType::ExitLong => talus_markets::Side::Long,
            SignalType::ExitShort => talus_markets::Side::Short,
            _ => unreachable!("validate_exit only called for exit signal types"),
        };

        let position = existing_positions
            .iter()
            .find(|p| p.symbol == signal.symbol && p.side == expected_side && !p.is_closed())
            .ok_or_else(|| RiskRejection::NoMatchingPosition {
                symbol: signal.symbol.clone(),
            })?;

        let qty = signal.qty.min(position.qty).max(Decimal::ZERO);
        if qty.is_zero() {
            return Err(RiskRejection::NoMatchingPosition {
                symbol: signal.symbol.clone(),
            });
        }

        let order_id = uuid::Uuid::new_v4().to_string();
        let client_order_id = format!("x_{}", order_id.replace('-', "").chars().take(20).collect::<String>());

        Order::new_exit(
            order_id,
            self.exchange,
            signal.symbol.clone(),
            OrderSide::to_close(expected_side),
            self.default_order_type,
            qty,
            None,
            signal.strategy_id.clone(),
            client_order_id,
            now,
        )
        .map_err(|_| RiskRejection::NoMatchingPosition {
            symbol: signal.symbol.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use talus_trader::signal::Signal;

    fn spec() -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new("BTC"),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
            min_notional: dec!(5),
            price_tick: dec!(0.1),
        }
    }

    fn settings() -> RiskSettings {
        RiskSettings {
            per_trade: dec!(0.01),
            max_drawdown: dec!(0.30),
            max_consecutive_losses: 3,
            max_position_ratio: dec!(1.0),
            max_stop_loss_percent: dec!(50),
            max_positions_per_symbol: 1,
            margin_buffer: dec!(1.2),
        }
    }

    fn gate() -> RiskGate {
        let mut instruments = HashMap::new();
        instruments.insert(Symbol::new("BTC"), spec());
        RiskGate::new(settings(), ExchangeId::Mock, OrderType::Market, instruments)
    }

    fn account(total: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            total_equity: total,
            available_equity: total,
        }
    }

    /// S1 — Donchian breakout sizing.
    #[test]
    fn s1_sizes_entry_to_risk_budget() {
        let gate = gate();
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(49000),
            None,
            "breakout",
            Default::default(),
        );
        let order = gate
            .validate_and_create_order(&signal, &[], account(dec!(10000)), Utc::now())
            .unwrap();
        assert_eq!(order.qty, dec!(0.100));
        assert!(order.qty * signal.price >= dec!(5));
    }

    /// S2 — RiskGate rejection by drawdown.
    #[test]
    fn s2_rejects_on_drawdown() {
        let gate = gate();
        gate.observe_equity("donchian-48", dec!(10000));
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(49000),
            None,
            "breakout",
            Default::default(),
        );
        let result =
            gate.validate_and_create_order(&signal, &[], account(dec!(6900)), Utc::now());
        assert!(matches!(result, Err(RiskRejection::Drawdown { .. })));
        assert!(result.unwrap_err().to_string().contains("drawdown"));
    }

    #[test]
    fn rejects_stop_wider_than_max_percent() {
        let gate = gate();
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(10000), // 80% away
            None,
            "breakout",
            Default::default(),
        );
        let result =
            gate.validate_and_create_order(&signal, &[], account(dec!(10000)), Utc::now());
        assert!(matches!(result, Err(RiskRejection::StopTooWide { .. })));
    }

    #[test]
    fn rejects_entries_after_consecutive_losses_then_unblocks_on_win() {
        let gate = gate();
        for _ in 0..3 {
            gate.record_trade_result("donchian-48", false, dec!(-10));
        }
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(49000),
            None,
            "breakout",
            Default::default(),
        );
        assert!(matches!(
            gate.validate_and_create_order(&signal, &[], account(dec!(10000)), Utc::now()),
            Err(RiskRejection::ConsecutiveLosses { .. })
        ));

        gate.record_trade_result("donchian-48", true, dec!(50));
        assert!(gate
            .validate_and_create_order(&signal, &[], account(dec!(10000)), Utc::now())
            .is_ok());
    }

    #[test]
    fn exits_bypass_sizing_and_clamp_to_position_quantity() {
        let gate = gate();
        let position = Position::new(
            Symbol::new("BTC"),
            talus_markets::Side::Long,
            dec!(50000),
            dec!(0.05),
            dec!(49000),
            1,
            "donchian-48".into(),
            Utc::now(),
        );
        let signal = Signal::exit(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::ExitLong,
            dec!(51000),
            dec!(1), // larger than the position — must clamp
            "manual exit",
            talus_execution::ExitReason::StrategyExit,
        );
        let order = gate
            .validate_and_create_order(&signal, std::slice::from_ref(&position), account(dec!(10000)), Utc::now())
            .unwrap();
        assert_eq!(order.qty, dec!(0.05));
        assert!(order.reduce_only);
    }

    #[test]
    fn exit_without_matching_position_is_rejected() {
        let gate = gate();
        let signal = Signal::exit(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::ExitLong,
            dec!(51000),
            dec!(0.1),
            "manual exit",
            talus_execution::ExitReason::StrategyExit,
        );
        assert!(matches!(
            gate.validate_and_create_order(&signal, &[], account(dec!(10000)), Utc::now()),
            Err(RiskRejection::NoMatchingPosition { .. })
        ));
    }

    #[test]
    fn rejects_too_many_positions_per_symbol() {
        let gate = gate();
        let position = Position::new(
            Symbol::new("BTC"),
            talus_markets::Side::Long,
            dec!(50000),
            dec!(0.1),
            dec!(49000),
            1,
            "donchian-48".into(),
            Utc::now(),
        );
        let signal = Signal::entry(
            "donchian-48",
            Symbol::new("BTC"),
            SignalType::EntryLong,
            dec!(50000),
            Decimal::ZERO,
            dec!(49000),
            None,
            "breakout",
            Default::default(),
        );
        assert!(matches!(
            gate.validate_and_create_order(&signal, std::slice::from_ref(&position), account(dec!(10000)), Utc::now()),
            Err(RiskRejection::TooManyPositions { .. })
        ));
    }
}
