use talus_markets::Symbol;

/// Behavioral error taxonomy shared across the execution boundary (§7 of the
/// spec). Kinds, not concrete per-venue types: callers match on the kind to
/// decide retry/abort policy, never on a specific HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Timeouts, 5xx, TCP reset, OKX `code=50001`. Retried at the caller's
    /// policy layer; never fatal on its own.
    #[error("network error calling {operation} for {symbol:?}: {message}")]
    Network {
        operation: String,
        symbol: Option<Symbol>,
        message: String,
    },

    /// 401 / invalid signature. Fatal at startup; logged-and-aborted in
    /// steady state, never retried.
    #[error("authentication failed calling {operation}: {message}")]
    Auth {
        operation: String,
        message: String,
    },

    #[error("unknown symbol: {0}")]
    InvalidSymbol(Symbol),

    #[error("order rejected by exchange: {reason}")]
    OrderRejected { reason: String },

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    /// Cache/executor/tracker state observed an impossible transition (e.g.
    /// an order id moving status backward). Logged, the single offending
    /// operation aborts; never corrupts the tables around it.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("persistence I/O error for {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExecutionError {
    /// Whether the operation that produced this error is safe to retry
    /// under the caller's own backoff policy (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Network { .. } | ExecutionError::RateLimit { .. })
    }
}
