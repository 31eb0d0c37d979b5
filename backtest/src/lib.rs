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

//! Deterministic bar-by-bar replay of the live `Strategy` interface (§4.8):
//! [`engine::BacktestEngine`] drives the same `talus-trader::Strategy`
//! contract live trading uses, against a preloaded CSV file or a
//! REST-fetched bar series ([`data`]), and hands the resulting
//! `talus-analytics::BacktestReport` and closed-trade list to [`trade_log`]
//! for the `logs/backtest-trades.csv` output (§6).

pub mod data;
pub mod engine;
pub mod error;
pub mod position;
pub mod trade_log;

pub use engine::BacktestEngine;
pub use error::BacktestError;
