pub mod binance;
pub mod mock;
pub mod okx;

use crate::error::ExecutionError;
use crate::executor::PolledOrder;
use crate::order::Order;
use async_trait::async_trait;
use rust_decimal::Decimal;
use talus_markets::{OrderSide, Symbol};

/// An exchange-reported open position, as returned by
/// [`ExchangeClient::get_open_positions`]. Plain data — `PositionTracker`
/// turns this into a local [`crate::position::Position`] during
/// reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: Symbol,
    pub side: talus_markets::Side,
    pub entry_price: Decimal,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountInfo {
    pub total_equity: Decimal,
    pub available_equity: Decimal,
}

/// The operation surface every venue must expose to the rest of the
/// pipeline (§9 Design Note: "Model as an interface plus a separately
/// queried capability; avoid deep inheritance"). Venue-specific quirks
/// (OKX contract-value conversion, algoId prefixing, Binance's
/// `MARKET_LOT_SIZE`) stay entirely inside the concrete implementation.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn exchange(&self) -> talus_markets::ExchangeId;

    async fn get_account(&self) -> Result<AccountInfo, ExecutionError>;

    async fn get_open_positions(&self, symbol: &Symbol) -> Result<Vec<OpenPosition>, ExecutionError>;

    /// Returns the exchange-assigned order id.
    async fn place_order(&self, order: &Order) -> Result<String, ExecutionError>;

    async fn cancel_order(
        &self,
        exchange: talus_markets::ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<(), ExecutionError>;

    async fn get_order_status(
        &self,
        exchange: talus_markets::ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<PolledOrder, ExecutionError>;

    async fn get_ticker(&self, symbol: &Symbol) -> Result<talus_data::Ticker, ExecutionError>;

    /// `None` for venues without exchange-hosted protective stops (or
    /// during tests that want to force the local-stop-monitor fallback
    /// path). `Some` otherwise.
    fn protective_stops(&self) -> Option<&dyn ProtectiveStopCapability>;
}

/// The exchange-hosted protective-stop capability (§4.6 "Exchange
/// capability contract"). Only venues that actually support a reduce-only
/// stop-market order implement this; `StopOrchestrator` falls back to
/// local stop monitoring when [`ExchangeClient::protective_stops`] returns
/// `None` or any call here fails.
#[async_trait]
pub trait ProtectiveStopCapability: Send + Sync {
    fn normalize_market_quantity(&self, symbol: &Symbol, raw_qty: Decimal) -> Result<Decimal, ExecutionError>;

    /// Tick-size rounding in the direction that keeps the stop strictly
    /// outside the current side: a `Sell` stop (closing a long) rounds up,
    /// a `Buy` stop (closing a short) rounds down.
    fn normalize_stop_price(
        &self,
        symbol: &Symbol,
        close_side: OrderSide,
        raw_price: Decimal,
    ) -> Result<Decimal, ExecutionError>;

    async fn place_reduce_only_stop_market(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
        client_id: &str,
    ) -> Result<String, ExecutionError>;

    async fn cancel_reduce_only_stop_orders(&self, symbol: &Symbol) -> Result<usize, ExecutionError>;
}
