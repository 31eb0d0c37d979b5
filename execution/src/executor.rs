use crate::client::ExchangeClient;
use crate::error::ExecutionError;
use crate::order::{Order, OrderStatus};
use crate::persistence::OrderStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A status-change notification fired after every successful transition,
/// so `PositionTracker` and strategy listeners observe fills without
/// polling the executor's tables directly.
pub type OrderListener = Arc<dyn Fn(&Order) + Send + Sync>;

/// Idempotent submit/cancel over three in-memory tables keyed by order id
/// (§4.5). Every transition is persisted atomically before the in-memory
/// table is considered authoritative, so [`OrderExecutor::recover`] can
/// always reconstruct state from disk after a crash.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    store: OrderStore,
    pending: RwLock<HashMap<String, Order>>,
    submitted: RwLock<HashMap<String, Order>>,
    filled: RwLock<HashMap<String, Order>>,
    listeners: RwLock<Vec<OrderListener>>,
}

impl std::fmt::Debug for OrderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderExecutor").finish_non_exhaustive()
    }
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, store: OrderStore) -> Self {
        OrderExecutor {
            client,
            store,
            pending: RwLock::new(HashMap::new()),
            submitted: RwLock::new(HashMap::new()),
            filled: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: OrderListener) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, order: &Order) {
        for listener in self.listeners.read().iter() {
            listener(order);
        }
    }

    /// Idempotent: if `order.id` is already tracked in `pending` or
    /// `submitted`, returns its id unchanged without calling the exchange
    /// again (§8 property 2).
    pub async fn submit(&self, order: Order) -> Result<String, ExecutionError> {
        let id = order.id.clone();

        if self.pending.read().contains_key(&id) || self.submitted.read().contains_key(&id) {
            return Ok(id);
        }

        self.pending.write().insert(id.clone(), order.clone());
        self.store.save(&order)?;

        match self.client.place_order(&order).await {
            Ok(exchange_order_id) => {
                let mut submitted_order = order;
                submitted_order.transition_to(OrderStatus::Submitted, chrono::Utc::now())?;
                submitted_order.exchange_order_id = Some(exchange_order_id);
                self.store.save(&submitted_order)?;

                self.pending.write().remove(&id);
                self.submitted.write().insert(id.clone(), submitted_order.clone());
                info!(order_id = %id, symbol = %submitted_order.symbol, "order submitted");
                self.notify(&submitted_order);
                Ok(id)
            }
            Err(err) => {
                let mut rejected = order;
                rejected.transition_to(OrderStatus::Rejected, chrono::Utc::now())?;
                self.store.save(&rejected)?;
                self.pending.write().remove(&id);
                warn!(order_id = %id, %err, "order rejected");
                self.notify(&rejected);
                Err(err)
            }
        }
    }

    /// Only valid for a `SUBMITTED` order; no-op-safe — calling twice after
    /// the first cancel succeeds returns `Ok(())` without a second exchange
    /// call since the id is no longer in `submitted`.
    pub async fn cancel(&self, id: &str) -> Result<(), ExecutionError> {
        let Some(order) = self.submitted.read().get(id).cloned() else {
            return Ok(());
        };

        self.client.cancel_order(order.exchange, &order.symbol, &order.client_order_id).await?;

        let mut cancelled = order;
        cancelled.transition_to(OrderStatus::Cancelled, chrono::Utc::now())?;
        self.store.save(&cancelled)?;
        self.submitted.write().remove(id);
        self.notify(&cancelled);
        Ok(())
    }

    /// Poll the exchange for `id`'s current state, update the in-memory
    /// table and persist, and notify listeners. Maps exchange status into
    /// the local status machine (`FILLED|PARTIAL|CANCELLED|SUBMITTED`).
    pub async fn check_status(&self, id: &str) -> Result<Order, ExecutionError> {
        let current = self
            .submitted
            .read()
            .get(id)
            .cloned()
            .or_else(|| self.filled.read().get(id).cloned())
            .ok_or_else(|| ExecutionError::InternalInvariantViolation(format!("unknown order id {id}")))?;

        let polled = self
            .client
            .get_order_status(current.exchange, &current.symbol, &current.client_order_id)
            .await?;

        let mut updated = current;
        updated.filled_qty = polled.filled_qty;
        updated.avg_fill_price = polled.avg_fill_price;
        updated.transition_to(polled.status, chrono::Utc::now())?;
        self.store.save(&updated)?;

        if updated.status == OrderStatus::Filled {
            self.submitted.write().remove(id);
            self.filled.write().insert(id.to_string(), updated.clone());
        } else if matches!(updated.status, OrderStatus::Partial | OrderStatus::Submitted) {
            self.submitted.write().insert(id.to_string(), updated.clone());
        } else if updated.status == OrderStatus::Cancelled {
            self.submitted.write().remove(id);
        }

        self.notify(&updated);
        Ok(updated)
    }

    /// Re-populate `pending`/`submitted` from disk and reconcile each
    /// non-terminal order against the exchange (§4.5 `recover()`).
    pub async fn recover(&self) -> Result<(), ExecutionError> {
        for order in self.store.load_all()? {
            match order.status {
                OrderStatus::Pending => {
                    self.pending.write().insert(order.id.clone(), order);
                }
                OrderStatus::Submitted | OrderStatus::Partial => {
                    self.submitted.write().insert(order.id.clone(), order);
                }
                OrderStatus::Filled => {
                    self.filled.write().insert(order.id.clone(), order);
                }
                OrderStatus::Rejected | OrderStatus::Cancelled => {}
            }
        }

        let ids: Vec<String> = self.submitted.read().keys().cloned().collect();
        for id in ids {
            if let Err(err) = self.check_status(&id).await {
                warn!(order_id = %id, %err, "failed to reconcile order on recovery");
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.read().len()
    }
}

/// Minimal polled-order shape an [`ExchangeClient`] hands back from
/// `get_order_status`.
#[derive(Debug, Clone)]
pub struct PolledOrder {
    pub status: OrderStatus,
    pub filled_qty: rust_decimal::Decimal,
    pub avg_fill_price: Option<rust_decimal::Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockExchangeClient;
    use crate::order::OrderType;
    use rust_decimal_macros::dec;
    use talus_markets::{ExchangeId, OrderSide, Symbol};

    fn new_order(id: &str) -> Order {
        Order::new_exit(
            id.into(),
            ExchangeId::Mock,
            Symbol::new("BTC"),
            OrderSide::Sell,
            OrderType::Market,
            dec!(1),
            None,
            "s1".into(),
            format!("c{id}"),
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn submit_is_idempotent() {
        let client = Arc::new(MockExchangeClient::new());
        let dir = tempfile::tempdir().unwrap();
        let executor = OrderExecutor::new(client.clone(), OrderStore::new(dir.path()));

        let order = new_order("o1");
        executor.submit(order.clone()).await.unwrap();
        let calls_after_first = client.place_order_calls();

        executor.submit(order).await.unwrap();
        assert_eq!(client.place_order_calls(), calls_after_first);
        assert_eq!(executor.submitted_count(), 1);
    }

    #[tokio::test]
    async fn recover_reloads_persisted_orders() {
        let client = Arc::new(MockExchangeClient::new());
        let dir = tempfile::tempdir().unwrap();
        {
            let executor = OrderExecutor::new(client.clone(), OrderStore::new(dir.path()));
            executor.submit(new_order("o2")).await.unwrap();
        }

        let executor = OrderExecutor::new(client, OrderStore::new(dir.path()));
        executor.recover().await.unwrap();
        assert_eq!(executor.submitted_count(), 1);
    }
}
