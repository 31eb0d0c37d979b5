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

//! Shared domain value types for the trading pipeline: [`Symbol`], [`Interval`],
//! [`Side`], [`ExchangeId`] and per-instrument sizing specs. Every other crate
//! in the workspace depends on this one; it depends on nothing upstream.

pub mod decimal;
pub mod exchange;
pub mod instrument;
pub mod interval;
pub mod side;
pub mod symbol;

pub use decimal::{checked_div_or_zero, round_half_up, round_step_down, round_stop_price_tick};
pub use exchange::ExchangeId;
pub use instrument::{InstrumentSpec, InstrumentSpecError};
pub use interval::Interval;
pub use side::{OrderSide, Side};
pub use symbol::Symbol;
