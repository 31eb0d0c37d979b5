use crate::bar::{Bar, Ticker};
use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use talus_markets::{Interval, Symbol};

/// One ingested market event. `is_final` distinguishes a finalized bar
/// (dispatch to strategies) from an intra-bar update (cache-only refresh,
/// §4.1 finalization rule).
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Bar { bar: Bar, is_final: bool },
    Ticker(Ticker),
}

/// The external collaborator boundary between `talus-data` and a concrete
/// exchange client: the cache and stream supervisor depend only on this
/// trait, never on a venue's wire format. `talus-execution`'s Binance/OKX
/// clients implement it.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Fetch up to `limit` finalized bars for `symbol`/`interval`, strictly
    /// older than `end_time` (the most recent `limit` bars overall when
    /// `end_time` is `None`). Callers page backward through history by
    /// passing the oldest bar's `open_time` from the previous batch as the
    /// next call's `end_time` (§4.1 "pulls `n` bars via REST in batches of
    /// 1000 backward from now").
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: u32,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError>;

    /// Open a subscription for `symbol`/`interval`, yielding bar/ticker events
    /// until the stream ends (error, close, or explicit unsubscribe via
    /// dropping the stream).
    async fn connect(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<BoxStream<'static, Result<FeedEvent, DataError>>, DataError>;
}
