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

//! The trading engine: wires market data, strategy evaluation, risk,
//! execution, position tracking and per-strategy health into one running
//! system (§2, §5).
//!
//! ```text
//! StreamSupervisor (finalized bars)
//!           ↓
//!    StrategyEvaluator  ───▶ signal listeners (audit, logging, ...)
//!           ↓
//!         RiskGate
//!           ↓
//!      OrderExecutor ──▶ exchange
//!           ↓
//!   PositionTracker / StopOrchestrator
//!           ↓
//!   RiskGate::record_trade_result, per-strategy health ladder
//! ```
//!
//! [`TradingEngine`] is the entry point: construct it with
//! [`TradingEngine::new`], call [`TradingEngine::recover`] once before
//! subscribing to live data, register every strategy with
//! [`TradingEngine::register_strategy`], then [`TradingEngine::start`] each
//! `(symbol, interval)` it should trade and [`TradingEngine::start_sync_loop`]
//! for periodic position reconciliation (§4.6). [`TradingEngine::stop`] shuts
//! everything down in reverse order (§5).

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod health_store;
pub mod logging;
pub mod shutdown;

pub use engine::TradingEngine;
pub use error::CoreError;
pub use evaluator::{AlwaysHealthy, HealthGate, SignalListener, StrategyEvaluator};
pub use health_store::HealthStore;
