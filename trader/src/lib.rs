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

//! The strategy contract (§4.2): [`Strategy`] and its optional
//! [`EquityAware`]/[`BacktestTradeListener`] capabilities, entry [`Cooldown`]
//! tracking, and the [`Signal`] a strategy hands to `RiskGate`. Concrete
//! strategies live in the `strategies` crate.

pub mod cooldown;
pub mod signal;
pub mod strategy;

pub use cooldown::Cooldown;
pub use signal::{Signal, SignalType};
pub use strategy::{BacktestTradeListener, EquityAware, Strategy};
