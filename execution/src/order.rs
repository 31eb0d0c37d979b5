use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_markets::{ExchangeId, OrderSide, Symbol};

/// `MARKET` or `LIMIT`, exactly the two order types the pipeline issues
/// (§3: "type ∈ {MARKET, LIMIT}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// §4.5 status machine: `PENDING → SUBMITTED → (PARTIAL →)* FILLED`, or
/// `PENDING → REJECTED`, or `SUBMITTED → CANCELLED`. Backward transitions
/// are prohibited — enforced by [`Order::transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Partial,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    fn allowed_next(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Rejected)
                | (Submitted, Partial)
                | (Submitted, Filled)
                | (Submitted, Cancelled)
                | (Partial, Partial)
                | (Partial, Filled)
                | (Partial, Cancelled)
        )
    }
}

/// An order flowing through [`crate::executor::OrderExecutor`]. Constructed
/// by the risk gate, mutated only by the executor, persisted at every
/// transition (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    /// Mandatory for entry orders — never `None`/zero on an order that opens
    /// a position (§3 invariant: "stopLoss != null for entry orders").
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: OrderStatus,
    pub strategy_id: String,
    pub reduce_only: bool,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub avg_fill_price: Option<Decimal>,
    pub filled_qty: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new_entry(
        id: String,
        exchange: ExchangeId,
        symbol: Symbol,
        side: OrderSide,
        order_type: OrderType,
        qty: Decimal,
        price: Option<Decimal>,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        strategy_id: String,
        client_order_id: String,
        now: DateTime<Utc>,
    ) -> Result<Self, ExecutionError> {
        if qty <= Decimal::ZERO {
            return Err(ExecutionError::InternalInvariantViolation(
                "order quantity must be positive".into(),
            ));
        }
        if order_type == OrderType::Limit && price.is_none() {
            return Err(ExecutionError::InternalInvariantViolation(
                "LIMIT order requires a price".into(),
            ));
        }
        if stop_loss <= Decimal::ZERO {
            return Err(ExecutionError::InternalInvariantViolation(
                "entry order requires a positive stop-loss".into(),
            ));
        }
        Ok(Order {
            id,
            exchange,
            symbol,
            side,
            order_type,
            qty,
            price,
            stop_loss: Some(stop_loss),
            take_profit,
            status: OrderStatus::Pending,
            strategy_id,
            reduce_only: false,
            client_order_id,
            exchange_order_id: None,
            avg_fill_price: None,
            filled_qty: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_exit(
        id: String,
        exchange: ExchangeId,
        symbol: Symbol,
        side: OrderSide,
        order_type: OrderType,
        qty: Decimal,
        price: Option<Decimal>,
        strategy_id: String,
        client_order_id: String,
        now: DateTime<Utc>,
    ) -> Result<Self, ExecutionError> {
        if qty <= Decimal::ZERO {
            return Err(ExecutionError::InternalInvariantViolation(
                "order quantity must be positive".into(),
            ));
        }
        Ok(Order {
            id,
            exchange,
            symbol,
            side,
            order_type,
            qty,
            price,
            stop_loss: None,
            take_profit: None,
            status: OrderStatus::Pending,
            strategy_id,
            reduce_only: true,
            client_order_id,
            exchange_order_id: None,
            avg_fill_price: None,
            filled_qty: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply `next`, rejecting any transition not sanctioned by the status
    /// machine. Callers that hit `Err` have found an
    /// `InternalInvariantViolation` — log and abort that single operation,
    /// never silently force the state.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), ExecutionError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.allowed_next(next) {
            return Err(ExecutionError::InternalInvariantViolation(format!(
                "order {} cannot transition {:?} -> {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    pub fn remaining_qty(&self) -> Decimal {
        (self.qty - self.filled_qty).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(status: OrderStatus) -> Order {
        let mut order = Order::new_exit(
            "o1".into(),
            ExchangeId::Mock,
            Symbol::new("BTC"),
            OrderSide::Sell,
            OrderType::Market,
            dec!(1),
            None,
            "s1".into(),
            "c1".into(),
            Utc::now(),
        )
        .unwrap();
        order.status = status;
        order
    }

    #[test]
    fn forward_transitions_are_allowed() {
        let mut order = sample(OrderStatus::Pending);
        assert!(order.transition_to(OrderStatus::Submitted, Utc::now()).is_ok());
        assert!(order.transition_to(OrderStatus::Filled, Utc::now()).is_ok());
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut order = sample(OrderStatus::Filled);
        assert!(order.transition_to(OrderStatus::Submitted, Utc::now()).is_err());
    }

    #[test]
    fn entry_order_requires_positive_stop_loss() {
        let result = Order::new_entry(
            "o2".into(),
            ExchangeId::Mock,
            Symbol::new("BTC"),
            OrderSide::Buy,
            OrderType::Market,
            dec!(1),
            None,
            Decimal::ZERO,
            None,
            "s1".into(),
            "c2".into(),
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
