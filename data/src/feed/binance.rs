//! Binance USDT-margined futures market data: `/fapi/v1/klines` REST history
//! and the `@kline_<interval>` combined-stream WebSocket for live bars
//! (§4.1). Neither endpoint is signed — klines are public market data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use talus_integration::settings::BinanceSettings;
use talus_markets::{Interval, Symbol};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::bar::Bar;
use crate::error::DataError;
use crate::source::{FeedEvent, MarketFeed};

const LIVE_REST_BASE_URL: &str = "https://fapi.binance.com";
const LIVE_WS_BASE_URL: &str = "wss://fstream.binance.com";
const TESTNET_WS_BASE_URL: &str = "wss://stream.binancefuture.com";

#[derive(Debug, Clone)]
pub struct BinanceFeed {
    http: reqwest::Client,
    rest_base_url: String,
    ws_base_url: String,
}

impl BinanceFeed {
    pub fn new(settings: &BinanceSettings) -> Self {
        let (rest_base_url, ws_base_url) = if settings.testnet_enabled {
            (
                settings.testnet_rest_base_url.clone().unwrap_or_else(|| "https://testnet.binancefuture.com".to_string()),
                settings.testnet_ws_base_url.clone().unwrap_or_else(|| TESTNET_WS_BASE_URL.to_string()),
            )
        } else {
            (LIVE_REST_BASE_URL.to_string(), LIVE_WS_BASE_URL.to_string())
        };

        BinanceFeed {
            http: reqwest::Client::new(),
            rest_base_url,
            ws_base_url,
        }
    }
}

/// One row of the `/fapi/v1/klines` response: `[openTime, open, high, low,
/// close, volume, closeTime, quoteVolume, trades, takerBuyBase, takerBuyQuote, ignore]`.
#[derive(Debug, Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    String,
);

fn bar_from_raw(symbol: &Symbol, interval: Interval, raw: RawKline) -> Result<Bar, DataError> {
    let open_time = DateTime::from_timestamp_millis(raw.0).ok_or_else(|| DataError::Network {
        symbol: symbol.clone(),
        interval,
        message: format!("implausible open time {}", raw.0),
    })?;
    let parse = |field: &str| -> Result<Decimal, DataError> {
        field.parse::<Decimal>().map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("malformed decimal '{field}': {err}"),
        })
    };

    Ok(Bar::new(
        symbol.clone(),
        interval,
        open_time,
        parse(&raw.1)?,
        parse(&raw.2)?,
        parse(&raw.3)?,
        parse(&raw.4)?,
        parse(&raw.5)?,
        parse(&raw.7)?,
        raw.8,
    )?)
}

#[derive(Debug, Deserialize)]
struct KlineEventPayload {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
    q: String,
    n: u64,
    x: bool,
}

#[async_trait]
impl MarketFeed for BinanceFeed {
    async fn fetch_history(&self, symbol: &Symbol, interval: Interval, limit: u32, end_time: Option<DateTime<Utc>>) -> Result<Vec<Bar>, DataError> {
        let mut url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.rest_base_url,
            symbol.compact(),
            interval.code(),
            limit.min(1500),
        );
        if let Some(end_time) = end_time {
            url.push_str(&format!("&endTime={}", end_time.timestamp_millis()));
        }

        let response = self.http.get(&url).send().await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: err.to_string(),
        })?;

        let raw_klines: Vec<RawKline> = response.json().await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("decoding klines response: {err}"),
        })?;

        let mut bars = Vec::with_capacity(raw_klines.len());
        for raw in raw_klines {
            match bar_from_raw(symbol, interval, raw) {
                Ok(bar) => bars.push(bar),
                Err(err) => warn!(%symbol, %interval, %err, "dropping malformed kline row"),
            }
        }
        Ok(bars)
    }

    async fn connect(&self, symbol: &Symbol, interval: Interval) -> Result<BoxStream<'static, Result<FeedEvent, DataError>>, DataError> {
        let stream_name = format!("{}@kline_{}", symbol.compact().to_lowercase(), interval.code());
        let url = format!("{}/ws/{}", self.ws_base_url, stream_name);

        let (socket, _response) = tokio_tungstenite::connect_async(&url).await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("websocket connect to {url}: {err}"),
        })?;

        let symbol = symbol.clone();
        let events = socket.filter_map(move |message| {
            let symbol = symbol.clone();
            async move {
                match message {
                    Ok(Message::Text(text)) => Some(parse_kline_event(&symbol, interval, &text)),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                    Ok(Message::Close(frame)) => Some(Err(DataError::StreamClosed {
                        symbol: symbol.clone(),
                        interval,
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    })),
                    Ok(_) => None,
                    Err(err) => Some(Err(DataError::Network {
                        symbol: symbol.clone(),
                        interval,
                        message: err.to_string(),
                    })),
                }
            }
        });

        Ok(events.boxed())
    }
}

fn parse_kline_event(symbol: &Symbol, interval: Interval, text: &str) -> Result<FeedEvent, DataError> {
    let payload: KlineEventPayload = serde_json::from_str(text).map_err(|err| DataError::Network {
        symbol: symbol.clone(),
        interval,
        message: format!("decoding kline event: {err}"),
    })?;

    let open_time = DateTime::from_timestamp_millis(payload.k.t).ok_or_else(|| DataError::Network {
        symbol: symbol.clone(),
        interval,
        message: format!("implausible open time {}", payload.k.t),
    })?;
    let parse = |field: &str| -> Result<Decimal, DataError> {
        field.parse::<Decimal>().map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("malformed decimal '{field}': {err}"),
        })
    };

    let bar = Bar::new(
        symbol.clone(),
        interval,
        open_time,
        parse(&payload.k.o)?,
        parse(&payload.k.h)?,
        parse(&payload.k.l)?,
        parse(&payload.k.c)?,
        parse(&payload.k.v)?,
        parse(&payload.k.q)?,
        payload.k.n,
    )?;

    Ok(FeedEvent::Bar { bar, is_final: payload.k.x })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_finalized_kline_event() {
        let symbol = Symbol::new("BTC");
        let text = r#"{"e":"kline","E":1700000000000,"s":"BTCUSDT","k":{"t":1699999900000,"T":1700000199999,"s":"BTCUSDT","i":"15m","f":1,"L":2,"o":"100.0","c":"102.5","h":"103.0","l":"99.5","v":"10.0","n":42,"x":true,"q":"1000.0","V":"5.0","Q":"500.0","B":"0"}}"#;
        let event = parse_kline_event(&symbol, Interval::M15, text).unwrap();
        match event {
            FeedEvent::Bar { bar, is_final } => {
                assert!(is_final);
                assert_eq!(bar.close, Decimal::new(1025, 1));
            }
            _ => panic!("expected a bar event"),
        }
    }

    #[test]
    fn parses_an_intrabar_kline_event_as_non_final() {
        let symbol = Symbol::new("BTC");
        let text = r#"{"e":"kline","E":1700000000000,"s":"BTCUSDT","k":{"t":1699999900000,"T":1700000199999,"s":"BTCUSDT","i":"15m","f":1,"L":2,"o":"100.0","c":"101.0","h":"101.5","l":"99.5","v":"3.0","n":10,"x":false,"q":"300.0","V":"1.0","Q":"100.0","B":"0"}}"#;
        let event = parse_kline_event(&symbol, Interval::M15, text).unwrap();
        match event {
            FeedEvent::Bar { is_final, .. } => assert!(!is_final),
            _ => panic!("expected a bar event"),
        }
    }
}
