use crate::client::{AccountInfo, ExchangeClient, OpenPosition, ProtectiveStopCapability};
use crate::error::ExecutionError;
use crate::executor::PolledOrder;
use crate::order::{Order, OrderStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use talus_markets::{ExchangeId, OrderSide, Symbol};

/// In-memory exchange double used by unit/integration tests: accepts every
/// order instantly, tracks call counts so idempotency tests can assert on
/// them, and lets a test script inject open positions / ticker prices.
pub struct MockExchangeClient {
    place_order_calls: AtomicUsize,
    filled: RwLock<HashMap<String, PolledOrder>>,
    open_positions: RwLock<Vec<OpenPosition>>,
    tickers: RwLock<HashMap<Symbol, talus_data::Ticker>>,
    account: RwLock<AccountInfo>,
    supports_protective_stops: bool,
}

impl std::fmt::Debug for MockExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExchangeClient").finish_non_exhaustive()
    }
}

impl Default for MockExchangeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchangeClient {
    pub fn new() -> Self {
        MockExchangeClient {
            place_order_calls: AtomicUsize::new(0),
            filled: RwLock::new(HashMap::new()),
            open_positions: RwLock::new(Vec::new()),
            tickers: RwLock::new(HashMap::new()),
            account: RwLock::new(AccountInfo {
                total_equity: Decimal::from(10_000),
                available_equity: Decimal::from(10_000),
            }),
            supports_protective_stops: true,
        }
    }

    pub fn without_protective_stops(mut self) -> Self {
        self.supports_protective_stops = false;
        self
    }

    pub fn place_order_calls(&self) -> usize {
        self.place_order_calls.load(Ordering::SeqCst)
    }

    pub fn set_open_positions(&self, positions: Vec<OpenPosition>) {
        *self.open_positions.write() = positions;
    }

    pub fn set_ticker(&self, ticker: talus_data::Ticker) {
        self.tickers.write().insert(ticker.symbol.clone(), ticker);
    }

    pub fn set_account(&self, account: AccountInfo) {
        *self.account.write() = account;
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Mock
    }

    async fn get_account(&self) -> Result<AccountInfo, ExecutionError> {
        Ok(*self.account.read())
    }

    async fn get_open_positions(&self, symbol: &Symbol) -> Result<Vec<OpenPosition>, ExecutionError> {
        Ok(self
            .open_positions
            .read()
            .iter()
            .filter(|position| &position.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn place_order(&self, order: &Order) -> Result<String, ExecutionError> {
        self.place_order_calls.fetch_add(1, Ordering::SeqCst);
        let exchange_order_id = format!("mock-{}", order.client_order_id);
        self.filled.write().insert(
            exchange_order_id.clone(),
            PolledOrder {
                status: OrderStatus::Filled,
                filled_qty: order.qty,
                avg_fill_price: order.price.or(Some(Decimal::ZERO)),
            },
        );
        Ok(exchange_order_id)
    }

    async fn cancel_order(
        &self,
        _exchange: ExchangeId,
        _symbol: &Symbol,
        _order_id: &str,
    ) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn get_order_status(
        &self,
        _exchange: ExchangeId,
        _symbol: &Symbol,
        order_id: &str,
    ) -> Result<PolledOrder, ExecutionError> {
        let exchange_order_id = format!("mock-{order_id}");
        self.filled
            .read()
            .get(&exchange_order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::InternalInvariantViolation(format!("unknown mock order {order_id}")))
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<talus_data::Ticker, ExecutionError> {
        self.tickers
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidSymbol(symbol.clone()))
    }

    fn protective_stops(&self) -> Option<&dyn ProtectiveStopCapability> {
        if self.supports_protective_stops {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ProtectiveStopCapability for MockExchangeClient {
    fn normalize_market_quantity(&self, _symbol: &Symbol, raw_qty: Decimal) -> Result<Decimal, ExecutionError> {
        Ok(raw_qty)
    }

    fn normalize_stop_price(
        &self,
        _symbol: &Symbol,
        _close_side: OrderSide,
        raw_price: Decimal,
    ) -> Result<Decimal, ExecutionError> {
        Ok(raw_price)
    }

    async fn place_reduce_only_stop_market(
        &self,
        _symbol: &Symbol,
        _side: OrderSide,
        _stop_price: Decimal,
        _qty: Decimal,
        client_id: &str,
    ) -> Result<String, ExecutionError> {
        Ok(format!("mock-stop-{client_id}"))
    }

    async fn cancel_reduce_only_stop_orders(&self, _symbol: &Symbol) -> Result<usize, ExecutionError> {
        Ok(0)
    }
}
