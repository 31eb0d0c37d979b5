//! Traits and types for graceful shutdown of trading system components.
//!
//! ### Synchronous shutdown
//! ```rust,ignore
//! use talus_core::shutdown::SyncShutdown;
//!
//! struct SimpleComponent;
//!
//! impl SyncShutdown for SimpleComponent {
//!     type Result = ();
//!
//!     fn shutdown(&mut self) -> Self::Result {
//!         println!("component shut down");
//!     }
//! }
//! ```
//!
//! ### Asynchronous shutdown
//! ```rust,ignore
//! use talus_core::shutdown::AsyncShutdown;
//!
//! struct AsyncComponent;
//!
//! impl AsyncShutdown for AsyncComponent {
//!     type Result = Result<(), String>;
//!
//!     fn shutdown(&mut self) -> impl Future<Output = Self::Result> {
//!         async move {
//!             tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!             Ok(())
//!         }
//!     }
//! }
//! ```
//!
//! `TradingEngine::stop` (§5) composes both: it removes its signal listener
//! synchronously, then asynchronously stops the stream supervisors, the
//! sync loop task, and the order executor in turn.

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Components that can shut down immediately without async operations.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Components that need to perform async operations during shutdown —
/// flushing buffers, closing connections, awaiting in-flight requests.
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// A shutdown signal marker, usable in an event stream to indicate every
/// component should begin its shutdown procedure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub struct Shutdown;
