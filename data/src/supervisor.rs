use crate::cache::MarketDataCache;
use crate::source::{FeedEvent, MarketFeed};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use talus_markets::{Interval, Symbol};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_CAP: Duration = Duration::from_secs(30);
const RECONNECT_MAX_ATTEMPT_EXPONENT: u32 = 6;
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(RECONNECT_MAX_ATTEMPT_EXPONENT);
    let scaled = RECONNECT_BASE.saturating_mul(1u32 << exponent);
    scaled.min(RECONNECT_CAP)
}

/// Handle to a live subscription. Dropping it does not stop the
/// subscription — call [`SupervisorHandle::unsubscribe`] explicitly, mirroring
/// "On explicit `unsubscribe` or global `disconnect`: cancel reconnect +
/// fallback, close socket with code 1000."
#[derive(Debug)]
pub struct SupervisorHandle {
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn unsubscribe(self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
        self.task.abort();
    }
}

/// Owns the WebSocket subscription lifecycle for every `(symbol, interval)`
/// pair: connect, reconnect with exponential backoff, and a REST fallback
/// poll so the pipeline degrades but never stalls while disconnected.
#[derive(Clone)]
pub struct StreamSupervisor {
    feed: Arc<dyn MarketFeed>,
    cache: Arc<MarketDataCache>,
}

impl std::fmt::Debug for StreamSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSupervisor").finish_non_exhaustive()
    }
}

impl StreamSupervisor {
    pub fn new(feed: Arc<dyn MarketFeed>, cache: Arc<MarketDataCache>) -> Self {
        StreamSupervisor { feed, cache }
    }

    /// Subscribe to `symbol`/`interval`; `on_finalized_bar` is invoked
    /// synchronously on the delivering task whenever a bar closes (never for
    /// intra-bar updates, §4.1 finalization rule). The listener must not
    /// block.
    pub fn subscribe<L>(&self, symbol: Symbol, interval: Interval, on_finalized_bar: L) -> SupervisorHandle
    where
        L: Fn(talus_markets::Symbol, Interval) + Send + Sync + 'static,
    {
        let stop = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));

        let feed = self.feed.clone();
        let cache = self.cache.clone();
        let task_stop = stop.clone();
        let task_stopped = stopped.clone();

        let task = tokio::spawn(async move {
            run_subscription(feed, cache, symbol, interval, on_finalized_bar, task_stop, task_stopped).await;
        });

        SupervisorHandle { stop, stopped, task }
    }
}

async fn run_subscription<L>(
    feed: Arc<dyn MarketFeed>,
    cache: Arc<MarketDataCache>,
    symbol: Symbol,
    interval: Interval,
    on_finalized_bar: L,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
) where
    L: Fn(Symbol, Interval) + Send + Sync + 'static,
{
    let mut attempt: u32 = 0;

    while !stopped.load(Ordering::SeqCst) {
        match feed.connect(&symbol, interval).await {
            Ok(mut stream) => {
                attempt = 0; // onOpen clears the reconnect counter.
                info!(%symbol, %interval, "market stream connected");

                loop {
                    tokio::select! {
                        _ = stop.notified() => {
                            return;
                        }
                        next = stream.next() => {
                            match next {
                                Some(Ok(FeedEvent::Bar { bar, is_final })) => {
                                    let bar_symbol = bar.symbol.clone();
                                    let bar_interval = bar.interval;
                                    if let Err(err) = cache.append_or_update(bar) {
                                        warn!(%bar_symbol, %bar_interval, %err, "rejected out-of-order bar");
                                        continue;
                                    }
                                    if is_final {
                                        on_finalized_bar(bar_symbol, bar_interval);
                                    }
                                }
                                Some(Ok(FeedEvent::Ticker(_))) => {
                                    // Tickers refresh stop-check state elsewhere; the cache only stores bars.
                                }
                                Some(Err(err)) => {
                                    warn!(%symbol, %interval, %err, "market stream error, reconnecting");
                                    break;
                                }
                                None => {
                                    warn!(%symbol, %interval, "market stream closed, reconnecting");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(err) => {
                warn!(%symbol, %interval, %err, "failed to connect market stream");
            }
        }

        if stopped.load(Ordering::SeqCst) {
            return;
        }

        let delay = reconnect_delay(attempt);
        attempt += 1;

        run_fallback_poll_until_reconnected(&feed, &cache, &symbol, interval, delay, &stop, &stopped, &on_finalized_bar).await;
    }
}

/// Polls REST every 2s for the latest bar while a reconnect backoff is in
/// flight, so listeners keep receiving bar-finalized events even while the
/// socket is down (§4.1: "a REST fallback poll at 2s cadence that invokes
/// the same listener with the latest bar so the pipeline degrades but does
/// not stall").
async fn run_fallback_poll_until_reconnected<L>(
    feed: &Arc<dyn MarketFeed>,
    cache: &Arc<MarketDataCache>,
    symbol: &Symbol,
    interval: Interval,
    reconnect_delay: Duration,
    stop: &Arc<Notify>,
    stopped: &Arc<AtomicBool>,
    on_finalized_bar: &L,
) where
    L: Fn(Symbol, Interval) + Send + Sync + 'static,
{
    let deadline = tokio::time::Instant::now() + reconnect_delay;

    loop {
        if stopped.load(Ordering::SeqCst) || tokio::time::Instant::now() >= deadline {
            return;
        }

        tokio::select! {
            _ = stop.notified() => return,
            _ = tokio::time::sleep(FALLBACK_POLL_INTERVAL) => {
                if let Ok(latest) = feed.fetch_history(symbol, interval, 1, None).await {
                    if let Some(bar) = latest.into_iter().next() {
                        let bar_symbol = bar.symbol.clone();
                        let bar_interval = bar.interval;
                        if cache.append_or_update(bar).is_ok() {
                            on_finalized_bar(bar_symbol, bar_interval);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_grows_exponentially_then_caps() {
        assert_eq!(reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(5), Duration::from_secs(32).min(RECONNECT_CAP));
        assert_eq!(reconnect_delay(6), RECONNECT_CAP);
        // exponent clamps at 6 even for larger attempt counts
        assert_eq!(reconnect_delay(20), RECONNECT_CAP);
    }
}
