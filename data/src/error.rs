use crate::bar::BarError;
use talus_markets::{Interval, Symbol};

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("bar rejected: {0}")]
    InvalidBar(#[from] BarError),

    #[error("bar for {symbol}/{interval} is older than the latest cached bar; rejected")]
    StaleBar { symbol: Symbol, interval: Interval },

    #[error("network error fetching history for {symbol}/{interval}: {message}")]
    Network { symbol: Symbol, interval: Interval, message: String },

    #[error("websocket stream for {symbol}/{interval} closed: {reason}")]
    StreamClosed { symbol: Symbol, interval: Interval, reason: String },
}
