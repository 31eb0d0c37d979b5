//! Exchange identifiers for the trading pipeline.
//!
//! Only the two live venues the spec covers plus the two simulation venues
//! used by tests and the backtest engine.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifies the trading venue a component is talking to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum ExchangeId {
    /// Binance USD-margined perpetual futures.
    Binance,
    /// OKX v5 perpetual swaps.
    Okx,
    /// In-memory exchange used by unit/integration tests.
    Mock,
    /// The backtest engine's simulated fill venue.
    Simulated,
}

impl ExchangeId {
    pub fn is_live(&self) -> bool {
        matches!(self, ExchangeId::Binance | ExchangeId::Okx)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "BINANCE",
            ExchangeId::Okx => "OKX",
            ExchangeId::Mock => "MOCK",
            ExchangeId::Simulated => "SIMULATED",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognized exchange id: {0}")]
pub struct ParseExchangeIdError(String);

impl FromStr for ExchangeId {
    type Err = ParseExchangeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BINANCE" => Ok(ExchangeId::Binance),
            "OKX" => Ok(ExchangeId::Okx),
            "MOCK" => Ok(ExchangeId::Mock),
            "SIMULATED" => Ok(ExchangeId::Simulated),
            other => Err(ParseExchangeIdError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for id in [
            ExchangeId::Binance,
            ExchangeId::Okx,
            ExchangeId::Mock,
            ExchangeId::Simulated,
        ] {
            assert_eq!(id.to_string().parse::<ExchangeId>().unwrap(), id);
        }
    }

    #[test]
    fn unknown_exchange_is_rejected() {
        assert!("deribit".parse::<ExchangeId>().is_err());
    }
}
