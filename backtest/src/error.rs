//! Errors surfaced while loading a bar series or writing backtest output.
//! The simulation loop itself never fails mid-run (§4.8): a bad signal is
//! logged and skipped, never propagated.

use talus_data::DataError;

#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("failed to read bar data from {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("market data error fetching bar history: {0}")]
    Data(#[from] DataError),

    #[error("bar series is empty, nothing to backtest")]
    EmptyBarSeries,
}
