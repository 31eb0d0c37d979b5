#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! Market data ingestion: an ordered, deduplicated per-`(symbol, interval)`
//! bar cache ([`cache::MarketDataCache`]) fed by a supervised WebSocket
//! subscription with automatic reconnect and REST fallback
//! ([`supervisor::StreamSupervisor`]).

pub mod bar;
pub mod cache;
pub mod error;
pub mod feed;
pub mod source;
pub mod supervisor;

pub use bar::{Bar, Ticker};
pub use cache::MarketDataCache;
pub use error::DataError;
pub use feed::{BinanceFeed, OkxFeed};
pub use supervisor::{StreamSupervisor, SupervisorHandle};
