//! The top-level error type the trading engine surfaces (§7). Per-bar
//! failures — a feed hiccup, an exchange rejection, a risk-gate rejection —
//! are logged and absorbed by the engine itself; they never reach this
//! type. `CoreError` is for what the engine cannot recover from alone: a
//! malformed config, a fatal startup condition, or an underlying crate's
//! error bubbling out of a path with no fallback.

use talus_data::DataError;
use talus_execution::ExecutionError;
use talus_integration::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("market data error: {0}")]
    Data(#[from] DataError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("health state persistence error at {path}: {source}")]
    HealthPersistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A condition §7 names as fatal at startup: "refuse to start live
    /// trading, print a clear operator message, exit". The engine never
    /// raises this mid-run.
    #[error("fatal startup error: {0}")]
    FatalStartup(String),
}
