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

//! `RiskGate`, the authoritative policy layer (§4.4): every [`Signal`] from
//! a strategy passes through [`RiskGate::validate_and_create_order`] before
//! it becomes an [`Order`]. Holds final veto over trading-enabled state,
//! consecutive-loss counters, per-strategy drawdown, position-count limits,
//! sizing, margin, and stop-distance validation.
//!
//! [`Signal`]: talus_trader::Signal
//! [`Order`]: talus_execution::Order

pub mod gate;

pub use gate::{AccountSnapshot, RiskGate, RiskRejection, RiskSettings};
