//! Protective-stop orchestration (§4.6 "Stop arming"): prefer an
//! exchange-hosted reduce-only `STOP_MARKET`, fall back to local
//! price-triggered monitoring when the venue doesn't expose the capability
//! or any arming step fails.

use crate::client::ExchangeClient;
use crate::error::ExecutionError;
use crate::position::Position;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use talus_data::Ticker;
use talus_markets::{OrderSide, Side, Symbol};
use tracing::{info, warn};
use uuid::Uuid;

/// A currently-armed exchange-hosted stop, recorded so a later `arm()` call
/// can no-op on an identical `(price, qty)` instead of replacing it.
#[derive(Debug, Clone, PartialEq)]
struct ExchangeStopRecord {
    order_id: String,
    stop_price: Decimal,
    qty: Decimal,
}

/// A position being watched locally because the venue has no hosted stop
/// capability, or arming one failed.
#[derive(Debug, Clone, PartialEq)]
struct LocalStop {
    side: Side,
    stop_price: Decimal,
}

/// A local stop breach, routed back through `OrderExecutor::submit` by the
/// caller (`StopOrchestrator` never submits orders itself — it only decides
/// when a reduce-only close is due).
#[derive(Debug, Clone, PartialEq)]
pub struct StopTrigger {
    pub symbol: Symbol,
    pub side: Side,
}

#[derive(Debug, Default)]
pub struct StopOrchestrator {
    exchange_stops: RwLock<HashMap<Symbol, ExchangeStopRecord>>,
    local_stops: RwLock<HashMap<Symbol, LocalStop>>,
}

impl StopOrchestrator {
    pub fn new() -> Self {
        StopOrchestrator::default()
    }

    /// Arm (or re-affirm) a protective stop for `position`. Tries the
    /// exchange-hosted capability first; any failure — unsupported venue,
    /// normalization error, rejected order — falls back to local monitoring.
    pub async fn arm(&self, position: &Position, client: &dyn ExchangeClient) -> Result<(), ExecutionError> {
        if let Some(capability) = client.protective_stops() {
            match self.try_arm_exchange_stop(position, client, capability).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(symbol = %position.symbol, %err, "exchange stop arming failed, falling back to local monitor");
                }
            }
        }

        self.arm_local_stop(position);
        Ok(())
    }

    async fn try_arm_exchange_stop(
        &self,
        position: &Position,
        client: &dyn ExchangeClient,
        capability: &dyn crate::client::ProtectiveStopCapability,
    ) -> Result<(), ExecutionError> {
        let close_side = close_side_for(position.side);
        let qty = capability.normalize_market_quantity(&position.symbol, position.qty)?;
        let stop_price = capability.normalize_stop_price(&position.symbol, close_side, position.stop_loss)?;

        let already_armed = self
            .exchange_stops
            .read()
            .get(&position.symbol)
            .is_some_and(|existing| existing.stop_price == stop_price && existing.qty == qty);
        if already_armed {
            return Ok(());
        }

        let had_prior_record = self.exchange_stops.read().contains_key(&position.symbol);
        if !had_prior_record {
            // Clean slate after a restart: the venue may still carry a stop
            // this process has no record of.
            let _ = capability.cancel_reduce_only_stop_orders(&position.symbol).await;
        }

        if let Some(previous) = self.exchange_stops.write().remove(&position.symbol) {
            let _ = client.cancel_order(client.exchange(), &position.symbol, &previous.order_id).await;
        }

        let client_id = format!("sl_{}", Uuid::new_v4().simple());
        let client_id = &client_id[..client_id.len().min(36)];
        let order_id = capability
            .place_reduce_only_stop_market(&position.symbol, close_side, stop_price, qty, client_id)
            .await?;

        info!(symbol = %position.symbol, %stop_price, %qty, "armed exchange-hosted protective stop");
        self.exchange_stops
            .write()
            .insert(position.symbol.clone(), ExchangeStopRecord { order_id, stop_price, qty });
        self.local_stops.write().remove(&position.symbol);
        Ok(())
    }

    fn arm_local_stop(&self, position: &Position) {
        self.local_stops
            .write()
            .insert(position.symbol.clone(), LocalStop { side: position.side, stop_price: position.stop_loss });
    }

    /// Drop all tracking state for `symbol` — called when the tracked
    /// position is torn down (closed, or found gone on reconciliation).
    pub async fn clear(&self, symbol: &Symbol, client: &dyn ExchangeClient) {
        if let Some(record) = self.exchange_stops.write().remove(symbol) {
            let _ = client.cancel_order(client.exchange(), symbol, &record.order_id).await;
        }
        self.local_stops.write().remove(symbol);
    }

    /// Evaluate every locally-monitored stop against a ticker update;
    /// returns a trigger if `symbol`'s stop has been breached. The caller is
    /// responsible for removing the local stop once the resulting reduce
    /// order is confirmed.
    pub fn check_local_stop(&self, ticker: &Ticker) -> Option<StopTrigger> {
        let stops = self.local_stops.read();
        let stop = stops.get(&ticker.symbol)?;
        let breached = match stop.side {
            Side::Long => ticker.last <= stop.stop_price,
            Side::Short => ticker.last >= stop.stop_price,
        };
        breached.then(|| StopTrigger { symbol: ticker.symbol.clone(), side: stop.side })
    }

    pub fn has_local_stop(&self, symbol: &Symbol) -> bool {
        self.local_stops.read().contains_key(symbol)
    }
}

fn close_side_for(position_side: Side) -> OrderSide {
    match position_side {
        Side::Long => OrderSide::Sell,
        Side::Short => OrderSide::Buy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockExchangeClient;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        Position::new(Symbol::new("BTC"), Side::Long, dec!(50000), dec!(0.1), dec!(49000), 1, "s1".into(), chrono::Utc::now())
    }

    #[tokio::test]
    async fn arms_exchange_stop_when_capability_present() {
        let client = MockExchangeClient::new();
        let orchestrator = StopOrchestrator::new();
        orchestrator.arm(&long_position(), &client).await.unwrap();
        assert!(orchestrator.exchange_stops.read().contains_key(&Symbol::new("BTC")));
        assert!(!orchestrator.has_local_stop(&Symbol::new("BTC")));
    }

    #[tokio::test]
    async fn falls_back_to_local_stop_without_capability() {
        let client = MockExchangeClient::new().without_protective_stops();
        let orchestrator = StopOrchestrator::new();
        orchestrator.arm(&long_position(), &client).await.unwrap();
        assert!(orchestrator.has_local_stop(&Symbol::new("BTC")));
    }

    #[test]
    fn local_stop_triggers_on_breach_for_long() {
        let orchestrator = StopOrchestrator::new();
        orchestrator.arm_local_stop(&long_position());
        let ticker = Ticker::new(Symbol::new("BTC"), dec!(48900), dec!(48901), dec!(48900), chrono::Utc::now()).unwrap();
        assert_eq!(
            orchestrator.check_local_stop(&ticker),
            Some(StopTrigger { symbol: Symbol::new("BTC"), side: Side::Long })
        );
    }

    #[test]
    fn local_stop_does_not_trigger_above_threshold() {
        let orchestrator = StopOrchestrator::new();
        orchestrator.arm_local_stop(&long_position());
        let ticker = Ticker::new(Symbol::new("BTC"), dec!(49500), dec!(49501), dec!(49500), chrono::Utc::now()).unwrap();
        assert_eq!(orchestrator.check_local_stop(&ticker), None);
    }
}
