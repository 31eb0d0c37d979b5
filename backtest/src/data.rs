//! Assembles the bar series [`crate::engine::BacktestEngine`] replays: either
//! a local CSV file (`backtest.data.file`) or a REST-fetched history from a
//! [`MarketFeed`], filtered to `[start_time, end_time]` when the run's
//! settings name a window (§6 "backtest" config keys).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use talus_data::source::MarketFeed;
use talus_data::Bar;
use talus_markets::{Interval, Symbol};

use crate::error::BacktestError;

/// One CSV row. Column order matches Binance/OKX kline export conventions:
/// open time, OHLCV, quote volume, trade count.
#[derive(Debug, Deserialize)]
struct BarRow {
    open_time: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    #[serde(default)]
    quote_volume: Decimal,
    #[serde(default)]
    trades: u64,
}

/// Reads `path` as a CSV bar series for `symbol`/`interval`, sorted oldest
/// first. Malformed bars (e.g. `high < max(open, close)`) are dropped with a
/// logged warning rather than aborting the whole load.
pub fn load_bars_csv(path: &str, symbol: &Symbol, interval: Interval) -> Result<Vec<Bar>, BacktestError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| BacktestError::Csv { path: path.to_string(), source })?;

    let mut bars = Vec::new();
    for record in reader.deserialize::<BarRow>() {
        let row = record.map_err(|source| BacktestError::Csv { path: path.to_string(), source })?;
        match Bar::new(symbol.clone(), interval, row.open_time, row.open, row.high, row.low, row.close, row.volume, row.quote_volume, row.trades) {
            Ok(bar) => bars.push(bar),
            Err(err) => tracing::warn!(path, %err, "dropping malformed bar row"),
        }
    }

    bars.sort_by_key(|bar| bar.open_time);
    bars.dedup_by_key(|bar| bar.open_time);
    Ok(bars)
}

/// REST batch size per `fetch_history` call, mirroring
/// `MarketDataCache::initialize_history`'s paging.
const FETCH_BATCH_SIZE: u32 = 1_000;

/// Pages a feed's `fetch_history` backward from `end` until `start` is
/// covered or the feed runs out of data, then keeps only bars inside
/// `[start, end]`. Each call after the first passes the previous batch's
/// oldest `open_time` as the next `end_time` cursor, so successive calls
/// actually page further into the past instead of re-fetching the same
/// most-recent window.
pub async fn fetch_bar_series(
    feed: &dyn MarketFeed,
    symbol: &Symbol,
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Bar>, BacktestError> {
    let mut collected: Vec<Bar> = Vec::new();
    let mut cursor: Option<DateTime<Utc>> = Some(end);

    loop {
        let batch = feed.fetch_history(symbol, interval, FETCH_BATCH_SIZE, cursor).await?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len();
        let reached_start = batch.iter().any(|bar| bar.open_time <= start);
        let oldest_open_time = batch.iter().map(|bar| bar.open_time).min();
        collected.extend(batch);
        if reached_start || batch_len < FETCH_BATCH_SIZE as usize {
            break;
        }
        match (cursor, oldest_open_time) {
            (Some(previous), Some(oldest)) if oldest >= previous => break,
            _ => cursor = oldest_open_time,
        }
    }

    collected.sort_by_key(|bar| bar.open_time);
    collected.dedup_by_key(|bar| bar.open_time);
    collected.retain(|bar| bar.open_time >= start && bar.open_time <= end);
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_sorts_a_csv_bar_series() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "open_time,open,high,low,close,volume,quote_volume,trades").unwrap();
        writeln!(file, "2024-01-01T00:15:00Z,101,102,100,101.5,10,1000,5").unwrap();
        writeln!(file, "2024-01-01T00:00:00Z,100,101,99,100.5,10,1000,5").unwrap();
        file.flush().unwrap();

        let bars = load_bars_csv(file.path().to_str().unwrap(), &Symbol::new("BTC"), Interval::M15).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars[0].open_time < bars[1].open_time);
    }

    #[test]
    fn drops_rows_that_fail_bar_invariants() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "open_time,open,high,low,close,volume,quote_volume,trades").unwrap();
        writeln!(file, "2024-01-01T00:00:00Z,100,90,99,100.5,10,1000,5").unwrap(); // high < open
        file.flush().unwrap();

        let bars = load_bars_csv(file.path().to_str().unwrap(), &Symbol::new("BTC"), Interval::M15).unwrap();
        assert!(bars.is_empty());
    }
}
