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
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! Order and position domain types, the [`executor::OrderExecutor`]
//! (idempotent submit/cancel over a crash-recoverable on-disk order store),
//! and the [`client::ExchangeClient`]/[`client::ProtectiveStopCapability`]
//! trait boundary implemented by the Binance and OKX perpetual-futures
//! clients and by [`client::mock::MockExchangeClient`] for tests.

pub mod client;
pub mod error;
pub mod order;
pub mod persistence;
pub mod position;
pub mod stop;
pub mod trade;
pub mod tracker;

pub mod executor;

pub use client::{ExchangeClient, ProtectiveStopCapability};
pub use error::ExecutionError;
pub use order::{Order, OrderStatus, OrderType};
pub use persistence::OrderStore;
pub use position::Position;
pub use stop::StopOrchestrator;
pub use trade::{ClosedTrade, ExitReason};
pub use tracker::PositionTracker;
