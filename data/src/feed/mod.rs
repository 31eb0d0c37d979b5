//! Concrete [`crate::source::MarketFeed`] implementations. Both venues'
//! kline history and stream endpoints are public market data — no signing,
//! no API key — so these live in `talus-data` rather than alongside the
//! authenticated `talus-execution` exchange clients.

pub mod binance;
pub mod okx;

pub use binance::BinanceFeed;
pub use okx::OkxFeed;
