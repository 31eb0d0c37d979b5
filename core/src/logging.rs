//! Standardized logging initialization for the trading engine: structured,
//! `RUST_LOG`-filtered logs in either human-readable or JSON form.
//!
//! ### Standard logging (human-readable)
//! ```rust,ignore
//! use talus_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("trading engine started");
//! }
//! ```
//!
//! ### JSON logging (for log aggregators)
//! ```rust,ignore
//! use talus_core::logging::init_json_logging;
//!
//! fn main() {
//!     init_json_logging();
//!     tracing::info!("trading engine started");
//! }
//! ```
//!
//! ### Environment configuration
//! ```bash
//! export RUST_LOG=info
//! export RUST_LOG=talus_core=debug,talus_execution=info,talus_data=warn
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Human-readable logging, defaulting to `INFO` when `RUST_LOG` is unset.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// JSON logging, one flattened event object per line, suited to an
/// aggregator ingesting stdout.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
