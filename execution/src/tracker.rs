//! The authoritative local view of open positions per symbol, reconciled
//! against exchange state on a periodic sync tick (§4.6). `PositionTracker`
//! exclusively owns tracked positions; it hands `StopOrchestrator` a
//! reference by symbol on every call rather than holding it, so neither
//! struct owns the other (Design Note: avoid cyclic owning references —
//! model via explicit calls/callbacks instead).

use crate::client::ExchangeClient;
use crate::position::Position;
use crate::stop::{StopOrchestrator, StopTrigger};
use crate::trade::{ClosedTrade, ExitReason};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use talus_markets::{Side, Symbol};
use tracing::{info, warn};

const PENDING_ENTRY_TTL: Duration = Duration::minutes(5);
const TRANSIENT_WARN_SUPPRESS_WINDOW: Duration = Duration::seconds(30);
const DEFAULT_ORPHAN_STOP_PCT: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 0.02
const UNASSIGNED_STRATEGY: &str = "unassigned";

/// A fresh entry whose fill hasn't yet been confirmed with a concrete
/// `(entryPrice, qty)` — adopted on the next sync tick once the remote
/// position appears (§4.6 "Entry").
#[derive(Debug, Clone)]
struct PendingEntry {
    strategy_id: String,
    side: Side,
    stop_loss: Decimal,
    created_at: DateTime<Utc>,
}

impl PendingEntry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > PENDING_ENTRY_TTL
    }
}

pub type TradeResultListener = Arc<dyn Fn(&ClosedTrade) + Send + Sync>;

pub struct PositionTracker {
    tracked: RwLock<HashMap<Symbol, Position>>,
    pending_entries: RwLock<HashMap<Symbol, PendingEntry>>,
    strategy_registration: RwLock<Vec<(Symbol, String)>>,
    trade_listeners: RwLock<Vec<TradeResultListener>>,
    auto_adopt_orphans: bool,
    orphan_stop_pct: Decimal,
    last_transient_warn: RwLock<HashMap<Symbol, DateTime<Utc>>>,
}

impl std::fmt::Debug for PositionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionTracker")
            .field("tracked_symbols", &self.tracked.read().len())
            .finish_non_exhaustive()
    }
}

impl PositionTracker {
    pub fn new(auto_adopt_orphans: bool, orphan_stop_pct: Decimal) -> Self {
        let orphan_stop_pct = orphan_stop_pct.clamp(Decimal::new(1, 3), Decimal::new(5, 1));
        PositionTracker {
            tracked: RwLock::new(HashMap::new()),
            pending_entries: RwLock::new(HashMap::new()),
            strategy_registration: RwLock::new(Vec::new()),
            trade_listeners: RwLock::new(Vec::new()),
            auto_adopt_orphans,
            orphan_stop_pct,
            last_transient_warn: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_with_fallback() -> Self {
        PositionTracker::new(true, DEFAULT_ORPHAN_STOP_PCT)
    }

    pub fn add_trade_listener(&self, listener: TradeResultListener) {
        self.trade_listeners.write().push(listener);
    }

    fn notify_trade(&self, trade: &ClosedTrade) {
        for listener in self.trade_listeners.read().iter() {
            listener(trade);
        }
    }

    /// Registers that `strategy_id` trades `symbol`, in call order. Used by
    /// orphan adoption to pick "the nearest strategy on that symbol".
    pub fn register_strategy_symbol(&self, symbol: Symbol, strategy_id: String) {
        self.strategy_registration.write().push((symbol, strategy_id));
    }

    fn first_registered_strategy(&self, symbol: &Symbol) -> Option<String> {
        let registrations = self.strategy_registration.read();
        let matches: Vec<&String> =
            registrations.iter().filter(|(sym, _)| sym == symbol).map(|(_, id)| id).collect();
        if matches.len() > 1 {
            warn!(%symbol, candidates = matches.len(), "multiple strategies registered for orphan symbol, using first registered");
        }
        matches.first().map(|id| id.to_string())
    }

    pub fn tracked_position(&self, symbol: &Symbol) -> Option<Position> {
        self.tracked.read().get(symbol).cloned()
    }

    pub fn tracked_symbols(&self) -> Vec<Symbol> {
        self.tracked.read().keys().cloned().collect()
    }

    /// Record a not-yet-confirmed entry so the next sync tick can adopt it
    /// once the remote fill becomes visible (§4.6 "Entry").
    pub fn record_pending_entry(&self, symbol: Symbol, strategy_id: String, side: Side, stop_loss: Decimal, now: DateTime<Utc>) {
        self.pending_entries
            .write()
            .insert(symbol, PendingEntry { strategy_id, side, stop_loss, created_at: now });
    }

    /// Called once an entry fill is confirmed with a concrete quantity and
    /// price (either immediately, or via `pending_entry` adoption on the
    /// next tick). Arms the protective stop and publishes the new position.
    pub async fn confirm_entry(
        &self,
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        qty: Decimal,
        stop_loss: Decimal,
        strategy_id: String,
        leverage: u32,
        now: DateTime<Utc>,
        stops: &StopOrchestrator,
        client: &dyn ExchangeClient,
    ) -> Result<(), crate::error::ExecutionError> {
        let position = Position::new(symbol.clone(), side, entry_price, qty, stop_loss, leverage, strategy_id, now);
        stops.arm(&position, client).await.ok();
        self.tracked.write().insert(symbol.clone(), position);
        self.pending_entries.write().remove(&symbol);
        info!(%symbol, %entry_price, %qty, "position entry confirmed");
        Ok(())
    }

    /// Called once an exit fill is confirmed. Computes realized PnL,
    /// notifies trade-result listeners (feeding `RiskGate::record_trade_result`
    /// without a direct dependency), reduces or tears down the tracked
    /// position, and re-arms the stop if it remains open.
    #[allow(clippy::too_many_arguments)]
    pub async fn confirm_exit(
        &self,
        symbol: &Symbol,
        exit_price: Decimal,
        filled_qty: Decimal,
        fee: Decimal,
        exit_reason: ExitReason,
        trade_id: String,
        now: DateTime<Utc>,
        stops: &StopOrchestrator,
        client: &dyn ExchangeClient,
    ) -> Option<ClosedTrade> {
        if filled_qty <= Decimal::ZERO {
            return None;
        }

        let mut tracked = self.tracked.write();
        let position = tracked.get_mut(symbol)?;
        let removed = position.reduce(filled_qty);
        let gross_pnl = (exit_price - position.entry_price) * Decimal::from(position.side.pnl_sign()) * removed;

        let trade = ClosedTrade {
            id: trade_id,
            symbol: symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            qty: removed,
            gross_pnl,
            fee,
            strategy_id: position.strategy_id.clone(),
            exit_reason,
            opened_at: position.opened_at,
            closed_at: now,
        };

        let is_closed = position.is_closed();
        let remaining = position.clone();
        if is_closed {
            tracked.remove(symbol);
        }
        drop(tracked);

        if is_closed {
            stops.clear(symbol, client).await;
        } else {
            stops.arm(&remaining, client).await.ok();
        }

        self.notify_trade(&trade);
        Some(trade)
    }

    /// The periodic reconciliation tick (§4.6 "Periodic reconciliation
    /// loop"), run every 2s by the trading engine's sync loop. Returns any
    /// local stop breaches the caller must route back through
    /// `OrderExecutor::submit` as reduce-only closes.
    pub async fn sync(
        &self,
        client: &dyn ExchangeClient,
        stops: &StopOrchestrator,
        known_symbols: &[Symbol],
        now: DateTime<Utc>,
    ) -> Vec<StopTrigger> {
        let mut triggers = Vec::new();

        for symbol in known_symbols {
            match self.sync_symbol(symbol, client, stops, now).await {
                Ok(()) => {}
                Err(err) => {
                    self.warn_transient(symbol, &err, now);
                    continue;
                }
            }

            if let Ok(ticker) = client.get_ticker(symbol).await {
                if let Some(trigger) = stops.check_local_stop(&ticker) {
                    triggers.push(trigger);
                }
            }
        }

        triggers
    }

    fn warn_transient(&self, symbol: &Symbol, err: &crate::error::ExecutionError, now: DateTime<Utc>) {
        let mut last_warn = self.last_transient_warn.write();
        let should_warn = last_warn
            .get(symbol)
            .map_or(true, |previous| now - *previous > TRANSIENT_WARN_SUPPRESS_WINDOW);
        if should_warn {
            warn!(%symbol, %err, "transient error during position sync");
            last_warn.insert(symbol.clone(), now);
        }
    }

    async fn sync_symbol(
        &self,
        symbol: &Symbol,
        client: &dyn ExchangeClient,
        stops: &StopOrchestrator,
        now: DateTime<Utc>,
    ) -> Result<(), crate::error::ExecutionError> {
        let remote = client.get_open_positions(symbol).await?;

        if remote.is_empty() {
            if self.tracked.write().remove(symbol).is_some() {
                stops.clear(symbol, client).await;
            }
            self.prune_expired_pending_entries(symbol, now);
            return Ok(());
        }

        let has_local = self.tracked.read().contains_key(symbol);
        if !has_local {
            self.adopt(symbol, &remote, client, stops, now).await;
            return Ok(());
        }

        let tracked_side = self.tracked.read().get(symbol).map(|position| position.side);
        let Some(tracked_side) = tracked_side else { return Ok(()) };
        let Some(matching_remote) = remote.iter().find(|position| position.side == tracked_side) else {
            if self.tracked.write().remove(symbol).is_some() {
                stops.clear(symbol, client).await;
            }
            return Ok(());
        };

        let mut should_rearm = false;
        {
            let mut tracked = self.tracked.write();
            if let Some(position) = tracked.get_mut(symbol) {
                if matching_remote.qty < position.qty {
                    let delta = position.qty - matching_remote.qty;
                    position.reduce(delta);
                    should_rearm = !position.is_closed();
                } else if matching_remote.qty > position.qty {
                    position.qty = matching_remote.qty;
                    position.entry_price = matching_remote.entry_price;
                    should_rearm = true;
                }
                if position.is_closed() {
                    tracked.remove(symbol);
                }
            }
        }

        if should_rearm {
            if let Some(position) = self.tracked.read().get(symbol).cloned() {
                stops.arm(&position, client).await.ok();
            }
        }

        Ok(())
    }

    async fn adopt(
        &self,
        symbol: &Symbol,
        remote: &[crate::client::OpenPosition],
        client: &dyn ExchangeClient,
        stops: &StopOrchestrator,
        now: DateTime<Utc>,
    ) {
        let pending = self.pending_entries.read().get(symbol).cloned();
        if let Some(pending) = pending {
            if !pending.expired(now) {
                if let Some(remote_position) = remote.iter().find(|position| position.side == pending.side) {
                    let position = Position::new(
                        symbol.clone(),
                        pending.side,
                        remote_position.entry_price,
                        remote_position.qty,
                        pending.stop_loss,
                        1,
                        pending.strategy_id.clone(),
                        now,
                    );
                    stops.arm(&position, client).await.ok();
                    self.tracked.write().insert(symbol.clone(), position);
                    self.pending_entries.write().remove(symbol);
                    info!(%symbol, "adopted pending entry on reconciliation");
                    return;
                }
            } else {
                self.pending_entries.write().remove(symbol);
            }
        }

        if !self.auto_adopt_orphans {
            return;
        }

        // Orphan adoption: no local record at all, but the exchange reports
        // an open position. Build a fallback stop and assign ownership to
        // the first strategy registered for this symbol, or a sentinel id.
        let Some(remote_position) = remote.first() else { return };
        let pct = self.orphan_stop_pct;
        let stop_loss = match remote_position.side {
            Side::Long => remote_position.entry_price * (Decimal::ONE - pct),
            Side::Short => remote_position.entry_price * (Decimal::ONE + pct),
        };
        let strategy_id = self.first_registered_strategy(symbol).unwrap_or_else(|| UNASSIGNED_STRATEGY.to_string());

        let position = Position::new(
            symbol.clone(),
            remote_position.side,
            remote_position.entry_price,
            remote_position.qty,
            stop_loss,
            1,
            strategy_id,
            now,
        );
        warn!(%symbol, "adopted orphan position with fallback stop");
        stops.arm(&position, client).await.ok();
        self.tracked.write().insert(symbol.clone(), position);
    }

    fn prune_expired_pending_entries(&self, symbol: &Symbol, now: DateTime<Utc>) {
        let mut pending = self.pending_entries.write();
        if pending.get(symbol).is_some_and(|entry| entry.expired(now)) {
            pending.remove(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockExchangeClient;
    use crate::client::OpenPosition;
    use rust_decimal_macros::dec;
    use talus_markets::Symbol;

    #[tokio::test]
    async fn confirm_entry_then_confirm_exit_notifies_listener() {
        let client = MockExchangeClient::new();
        let stops = StopOrchestrator::new();
        let tracker = PositionTracker::new(true, DEFAULT_ORPHAN_STOP_PCT);

        let notified = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = notified.clone();
        tracker.add_trade_listener(std::sync::Arc::new(move |trade: &ClosedTrade| {
            sink.lock().push(trade.clone());
        }));

        tracker
            .confirm_entry(
                Symbol::new("BTC"),
                Side::Long,
                dec!(50000),
                dec!(0.1),
                dec!(49000),
                "s1".into(),
                1,
                Utc::now(),
                &stops,
                &client,
            )
            .await
            .unwrap();

        let trade = tracker
            .confirm_exit(
                &Symbol::new("BTC"),
                dec!(51000),
                dec!(0.1),
                dec!(1),
                ExitReason::TakeProfit,
                "t1".into(),
                Utc::now(),
                &stops,
                &client,
            )
            .await
            .unwrap();

        assert_eq!(trade.gross_pnl, dec!(100));
        assert_eq!(notified.lock().len(), 1);
        assert!(tracker.tracked_position(&Symbol::new("BTC")).is_none());
    }

    #[tokio::test]
    async fn orphan_adoption_uses_fallback_stop_and_sentinel_strategy() {
        let client = MockExchangeClient::new();
        client.set_open_positions(vec![OpenPosition {
            symbol: Symbol::new("ETH"),
            side: Side::Long,
            entry_price: dec!(2000),
            qty: dec!(1),
        }]);
        let stops = StopOrchestrator::new();
        let tracker = PositionTracker::new(true, DEFAULT_ORPHAN_STOP_PCT);

        let triggers = tracker.sync(&client, &stops, &[Symbol::new("ETH")], Utc::now()).await;
        assert!(triggers.is_empty());

        let adopted = tracker.tracked_position(&Symbol::new("ETH")).unwrap();
        assert_eq!(adopted.strategy_id, UNASSIGNED_STRATEGY);
        assert_eq!(adopted.stop_loss, dec!(1960.00));
    }

    #[tokio::test]
    async fn empty_remote_tears_down_local_tracking() {
        let client = MockExchangeClient::new();
        let stops = StopOrchestrator::new();
        let tracker = PositionTracker::new(false, DEFAULT_ORPHAN_STOP_PCT);

        tracker
            .confirm_entry(Symbol::new("BTC"), Side::Long, dec!(50000), dec!(0.1), dec!(49000), "s1".into(), 1, Utc::now(), &stops, &client)
            .await
            .unwrap();
        assert!(tracker.tracked_position(&Symbol::new("BTC")).is_some());

        tracker.sync(&client, &stops, &[Symbol::new("BTC")], Utc::now()).await;
        assert!(tracker.tracked_position(&Symbol::new("BTC")).is_none());
    }
}
