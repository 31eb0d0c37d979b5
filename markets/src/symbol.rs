use serde::{Deserialize, Serialize};
use std::fmt;

/// A USDT-margined perpetual instrument, e.g. `BTC-USDT`.
///
/// The quote asset is always `USDT`; the platform does not trade spot or
/// coin-margined products (see Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub base: String,
    quote: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseSymbolError {
    #[error("symbol '{0}' is not in BASE-QUOTE form")]
    MalformedSymbol(String),
    #[error("symbol '{0}' has quote asset '{1}', only USDT is supported")]
    NonUsdtQuote(String, String),
}

impl Symbol {
    pub const QUOTE: &'static str = "USDT";

    /// Construct a `Symbol`, enforcing the USDT-quote invariant.
    pub fn new(base: impl Into<String>) -> Self {
        Symbol {
            base: base.into(),
            quote: Self::QUOTE.to_string(),
        }
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Exchange-style compact form with no separator, e.g. `BTCUSDT`.
    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Parse a `BASE-QUOTE` string, e.g. `BTC-USDT`.
    pub fn parse(raw: &str) -> Result<Self, ParseSymbolError> {
        let (base, quote) = raw
            .split_once('-')
            .ok_or_else(|| ParseSymbolError::MalformedSymbol(raw.to_string()))?;
        if !quote.eq_ignore_ascii_case(Self::QUOTE) {
            return Err(ParseSymbolError::NonUsdtQuote(
                raw.to_string(),
                quote.to_string(),
            ));
        }
        Ok(Symbol::new(base.to_uppercase()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_usdt_pair() {
        let symbol = Symbol::parse("BTC-USDT").unwrap();
        assert_eq!(symbol.base, "BTC");
        assert_eq!(symbol.quote(), "USDT");
        assert_eq!(symbol.compact(), "BTCUSDT");
    }

    #[test]
    fn rejects_non_usdt_quote() {
        assert!(matches!(
            Symbol::parse("BTC-USD"),
            Err(ParseSymbolError::NonUsdtQuote(_, _))
        ));
    }

    #[test]
    fn rejects_malformed_symbol() {
        assert!(matches!(
            Symbol::parse("BTCUSDT"),
            Err(ParseSymbolError::MalformedSymbol(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let symbol = Symbol::new("ETH");
        assert_eq!(Symbol::parse(&symbol.to_string()).unwrap(), symbol);
    }
}
