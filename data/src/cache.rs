use crate::bar::Bar;
use crate::error::DataError;
use crate::source::MarketFeed;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use talus_markets::{Interval, Symbol};

/// Oldest bars are evicted once a series exceeds this length.
pub const MAX_BARS_PER_SERIES: usize = 5_000;

/// REST history is paged backward from now in batches of this size.
const HISTORY_BATCH_SIZE: u32 = 1_000;

type Key = (Symbol, Interval);

/// The exclusive owner of every per-`(symbol, interval)` bar series.
/// Readers get cloned snapshots; they never block the single writer for a
/// given key (`§3`: "`MarketDataCache` exclusively owns the per-(symbol,interval)
/// bar list; readers get snapshots").
#[derive(Debug, Default)]
pub struct MarketDataCache {
    series: RwLock<HashMap<Key, VecDeque<Bar>>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull `n` bars of warm-up history via `source`, backward from now in
    /// batches of 1,000, dropping any bar whose close time is in the future
    /// (can happen with clock-skewed venues echoing the in-progress bar).
    ///
    /// Each batch after the first is requested with `end_time` set to the
    /// oldest open time seen so far, so successive calls page strictly
    /// further into the past instead of re-fetching the same most-recent
    /// window (`MarketFeed::fetch_history`'s `end_time` cursor).
    pub async fn initialize_history(
        &self,
        source: &dyn MarketFeed,
        symbol: &Symbol,
        interval: Interval,
        n: u32,
    ) -> Result<(), DataError> {
        let now = chrono::Utc::now();
        let mut collected: Vec<Bar> = Vec::with_capacity(n as usize);
        let mut cursor: Option<chrono::DateTime<chrono::Utc>> = None;

        while collected.len() < n as usize {
            let remaining = n as usize - collected.len();
            let batch_size = remaining.min(HISTORY_BATCH_SIZE as usize) as u32;
            let batch = source.fetch_history(symbol, interval, batch_size, cursor).await?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            let oldest_open_time = batch.iter().map(|bar| bar.open_time).min();
            collected.extend(batch.into_iter().filter(|bar| bar.close_time <= now));
            if batch_len < batch_size as usize {
                // Source had no more history to give.
                break;
            }
            match (cursor, oldest_open_time) {
                (Some(previous), Some(oldest)) if oldest >= previous => break, // feed did not page further back
                _ => cursor = oldest_open_time,
            }
        }

        collected.sort_by_key(|bar| bar.open_time);
        collected.dedup_by_key(|bar| bar.open_time);

        let mut guard = self.series.write();
        let series = guard.entry((symbol.clone(), interval)).or_default();
        series.clear();
        for bar in collected {
            series.push_back(bar);
        }
        truncate_to_capacity(series);
        Ok(())
    }

    /// Append a new bar, or replace the last bar in-place when its open time
    /// matches (an intra-bar update). Rejects bars strictly older than the
    /// latest.
    pub fn append_or_update(&self, bar: Bar) -> Result<(), DataError> {
        let key = (bar.symbol.clone(), bar.interval);
        let mut guard = self.series.write();
        let series = guard.entry(key).or_default();

        match series.back() {
            None => {
                series.push_back(bar);
            }
            Some(last) if last.open_time == bar.open_time => {
                *series.back_mut().expect("checked Some above") = bar;
            }
            Some(last) if bar.open_time > last.open_time => {
                series.push_back(bar);
            }
            Some(_) => {
                return Err(DataError::StaleBar {
                    symbol: bar.symbol,
                    interval: bar.interval,
                });
            }
        }

        truncate_to_capacity(series);
        Ok(())
    }

    /// A full copy-on-read snapshot of the series, oldest first.
    pub fn snapshot(&self, symbol: &Symbol, interval: Interval) -> Vec<Bar> {
        self.series
            .read()
            .get(&(symbol.clone(), interval))
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recent `n` bars, oldest first.
    pub fn tail(&self, symbol: &Symbol, interval: Interval, n: usize) -> Vec<Bar> {
        self.series
            .read()
            .get(&(symbol.clone(), interval))
            .map(|series| {
                let skip = series.len().saturating_sub(n);
                series.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }
}

fn truncate_to_capacity(series: &mut VecDeque<Bar>) {
    while series.len() > MAX_BARS_PER_SERIES {
        series.pop_front();
    }
}

/// A [`MarketFeed`] test double backed by an in-memory, ascending-by-open-time
/// bar list, used to exercise `initialize_history`'s backward paging without
/// a real exchange.
#[cfg(test)]
struct StaticFeed {
    bars: Vec<Bar>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl MarketFeed for StaticFeed {
    async fn fetch_history(
        &self,
        _symbol: &Symbol,
        _interval: Interval,
        limit: u32,
        end_time: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let candidates: Vec<&Bar> = match end_time {
            Some(cutoff) => self.bars.iter().filter(|bar| bar.open_time < cutoff).collect(),
            None => self.bars.iter().collect(),
        };
        let skip = candidates.len().saturating_sub(limit as usize);
        Ok(candidates[skip..].iter().map(|bar| (**bar).clone()).collect())
    }

    async fn connect(
        &self,
        _symbol: &Symbol,
        _interval: Interval,
    ) -> Result<futures_util::stream::BoxStream<'static, Result<crate::source::FeedEvent, DataError>>, DataError> {
        unimplemented!("StaticFeed only serves fetch_history in these tests")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar_at(minute: i64, open: rust_decimal::Decimal) -> Bar {
        let open_time = DateTimeUtc::from_timestamp(1_700_000_000 + minute * 60, 0).unwrap();
        Bar::new(
            Symbol::new("BTC"),
            Interval::M1,
            open_time,
            open,
            open + dec!(1),
            open - dec!(1),
            open,
            dec!(10),
            dec!(100),
            5,
        )
        .unwrap()
    }

    use chrono::DateTime as DateTimeUtc;

    #[test]
    fn append_or_update_orders_and_dedups() {
        let cache = MarketDataCache::new();
        cache.append_or_update(bar_at(0, dec!(100))).unwrap();
        cache.append_or_update(bar_at(1, dec!(101))).unwrap();
        // intra-bar update to the latest bar
        cache.append_or_update(bar_at(1, dec!(102))).unwrap();

        let snapshot = cache.snapshot(&Symbol::new("BTC"), Interval::M1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].open, dec!(102));
        // strictly non-decreasing open time
        assert!(snapshot.windows(2).all(|w| w[0].open_time <= w[1].open_time));
    }

    #[test]
    fn rejects_bars_older_than_latest() {
        let cache = MarketDataCache::new();
        cache.append_or_update(bar_at(5, dec!(100))).unwrap();
        let result = cache.append_or_update(bar_at(1, dec!(90)));
        assert!(result.is_err());
    }

    #[test]
    fn tail_returns_most_recent_n_oldest_first() {
        let cache = MarketDataCache::new();
        for i in 0..10 {
            cache.append_or_update(bar_at(i, dec!(100) + dec!(1) * rust_decimal::Decimal::from(i))).unwrap();
        }
        let tail = cache.tail(&Symbol::new("BTC"), Interval::M1, 3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.last().unwrap().open, dec!(109));
    }

    #[test]
    fn series_is_capped_at_max_bars() {
        let cache = MarketDataCache::new();
        for i in 0..(MAX_BARS_PER_SERIES as i64 + 10) {
            cache.append_or_update(bar_at(i, dec!(100))).unwrap();
        }
        assert_eq!(
            cache.snapshot(&Symbol::new("BTC"), Interval::M1).len(),
            MAX_BARS_PER_SERIES
        );
    }

    #[tokio::test]
    async fn initialize_history_pages_backward_past_one_batch() {
        // Two and a half batches' worth of bars so a single `fetch_history`
        // call (capped at HISTORY_BATCH_SIZE) cannot possibly satisfy `n`.
        let total_bars = HISTORY_BATCH_SIZE as i64 * 2 + 500;
        let bars: Vec<Bar> = (0..total_bars).map(|i| bar_at(i, dec!(100))).collect();
        let feed = StaticFeed { bars: bars.clone() };
        let cache = MarketDataCache::new();

        cache.initialize_history(&feed, &Symbol::new("BTC"), Interval::M1, total_bars as u32).await.unwrap();

        let snapshot = cache.snapshot(&Symbol::new("BTC"), Interval::M1);
        assert_eq!(snapshot.len(), total_bars as usize);
        assert_eq!(snapshot.first().unwrap().open_time, bars.first().unwrap().open_time);
        assert_eq!(snapshot.last().unwrap().open_time, bars.last().unwrap().open_time);
        assert!(snapshot.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }
}
