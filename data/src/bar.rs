use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use talus_markets::{Interval, Symbol};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BarError {
    #[error("bar OHLCV values must be non-negative")]
    NegativeOhlcv,
    #[error("bar high {high} must be >= max(open, close)")]
    HighBelowOpenClose { high: Decimal },
    #[error("bar low {low} must be <= min(open, close)")]
    LowAboveOpenClose { low: Decimal },
    #[error("bar close_time must equal open_time + interval - 1ms")]
    InconsistentCloseTime,
    #[error("crossed book: bid {bid} > ask {ask}")]
    CrossedBook { bid: Decimal, ask: Decimal },
}

/// A finalized OHLCV candle. Immutable once constructed — `Bar`s are never
/// mutated after insertion into the cache; an "update" replaces the whole
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades: u64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        interval: Interval,
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        quote_volume: Decimal,
        trades: u64,
    ) -> Result<Self, BarError> {
        if open.is_sign_negative()
            || high.is_sign_negative()
            || low.is_sign_negative()
            || close.is_sign_negative()
            || volume.is_sign_negative()
            || quote_volume.is_sign_negative()
        {
            return Err(BarError::NegativeOhlcv);
        }
        if high < open.max(close) {
            return Err(BarError::HighBelowOpenClose { high });
        }
        if low > open.min(close) {
            return Err(BarError::LowAboveOpenClose { low });
        }

        let close_time =
            open_time + interval.duration() - chrono::Duration::milliseconds(1);

        Ok(Bar {
            symbol,
            interval,
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume,
            trades,
        })
    }
}

/// A derived market-price snapshot. `last` prefers mark price over last trade
/// price where the venue distinguishes the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn new(
        symbol: Symbol,
        bid: Decimal,
        ask: Decimal,
        last: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, BarError> {
        if bid > Decimal::ZERO && ask > Decimal::ZERO && bid > ask {
            return Err(BarError::CrossedBook { bid, ask });
        }
        Ok(Ticker {
            symbol,
            bid,
            ask,
            last,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn close_time_is_open_plus_interval_minus_1ms() {
        let bar = Bar::new(
            Symbol::new("BTC"),
            Interval::M15,
            now(),
            dec!(100),
            dec!(105),
            dec!(95),
            dec!(102),
            dec!(10),
            dec!(1000),
            42,
        )
        .unwrap();
        assert_eq!(
            bar.close_time,
            now() + chrono::Duration::minutes(15) - chrono::Duration::milliseconds(1)
        );
    }

    #[test]
    fn rejects_high_below_open_close() {
        let result = Bar::new(
            Symbol::new("BTC"),
            Interval::M15,
            now(),
            dec!(100),
            dec!(99),
            dec!(95),
            dec!(102),
            dec!(10),
            dec!(1000),
            1,
        );
        assert_eq!(result, Err(BarError::HighBelowOpenClose { high: dec!(99) }));
    }

    #[test]
    fn rejects_negative_volume() {
        let result = Bar::new(
            Symbol::new("BTC"),
            Interval::M15,
            now(),
            dec!(100),
            dec!(105),
            dec!(95),
            dec!(102),
            dec!(-10),
            dec!(1000),
            1,
        );
        assert_eq!(result, Err(BarError::NegativeOhlcv));
    }

    #[test]
    fn ticker_rejects_crossed_book() {
        let result = Ticker::new(Symbol::new("BTC"), dec!(101), dec!(100), dec!(100), now());
        assert!(result.is_err());
    }
}
