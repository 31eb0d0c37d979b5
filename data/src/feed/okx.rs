//! OKX swap (perpetual futures) market data: `/api/v5/market/candles` REST
//! history and the `candle<bar>` business-channel WebSocket for live bars
//! (§4.1). Neither is signed — candles are public market data, unlike the
//! private endpoints `talus-execution::client::okx::OkxClient` authenticates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use talus_integration::settings::OkxSettings;
use talus_markets::{Interval, Symbol};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::bar::Bar;
use crate::error::DataError;
use crate::source::{FeedEvent, MarketFeed};

const LIVE_REST_BASE_URL: &str = "https://www.okx.com";
const LIVE_WS_BUSINESS_URL: &str = "wss://ws.okx.com:8443/ws/v5/business";

#[derive(Debug, Clone)]
pub struct OkxFeed {
    http: reqwest::Client,
    rest_base_url: String,
    ws_business_url: String,
}

impl OkxFeed {
    pub fn new(settings: &OkxSettings) -> Self {
        let (rest_base_url, ws_business_url) = if settings.demo_trading_enabled {
            (
                settings.demo_rest_url.clone().unwrap_or_else(|| LIVE_REST_BASE_URL.to_string()),
                settings.demo_ws_business_url.clone().unwrap_or_else(|| LIVE_WS_BUSINESS_URL.to_string()),
            )
        } else {
            (LIVE_REST_BASE_URL.to_string(), LIVE_WS_BUSINESS_URL.to_string())
        };

        OkxFeed {
            http: reqwest::Client::new(),
            rest_base_url,
            ws_business_url,
        }
    }

    fn inst_id(symbol: &Symbol) -> String {
        format!("{}-USDT-SWAP", symbol.base)
    }

    /// OKX's `bar` query param: same minute codes as the rest of the
    /// platform, but hour-and-above codes are upper-cased (`1H`, not `1h`).
    fn bar_code(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1H",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OkxEnvelope<T> {
    code: String,
    msg: String,
    data: T,
}

fn bar_from_row(symbol: &Symbol, interval: Interval, row: &[String]) -> Result<Bar, DataError> {
    if row.len() < 6 {
        return Err(DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("candle row has {} fields, expected at least 6", row.len()),
        });
    }

    let parse_i64 = |field: &str| -> Result<i64, DataError> {
        field.parse::<i64>().map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("malformed timestamp '{field}': {err}"),
        })
    };
    let parse_decimal = |field: &str| -> Result<Decimal, DataError> {
        field.parse::<Decimal>().map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("malformed decimal '{field}': {err}"),
        })
    };

    let open_time_ms = parse_i64(&row[0])?;
    let open_time = DateTime::from_timestamp_millis(open_time_ms).ok_or_else(|| DataError::Network {
        symbol: symbol.clone(),
        interval,
        message: format!("implausible open time {open_time_ms}"),
    })?;

    Ok(Bar::new(
        symbol.clone(),
        interval,
        open_time,
        parse_decimal(&row[1])?,
        parse_decimal(&row[2])?,
        parse_decimal(&row[3])?,
        parse_decimal(&row[4])?,
        parse_decimal(&row[5])?,
        row.get(7).map(|v| parse_decimal(v)).transpose()?.unwrap_or(Decimal::ZERO),
        0,
    )?)
}

/// `true` once OKX's `confirm` column (the last element) reads `"1"`
/// (candle closed); `"0"` while it is still forming.
fn row_is_final(row: &[String]) -> bool {
    row.last().map(|v| v == "1").unwrap_or(false)
}

#[async_trait]
impl MarketFeed for OkxFeed {
    async fn fetch_history(&self, symbol: &Symbol, interval: Interval, limit: u32, end_time: Option<DateTime<Utc>>) -> Result<Vec<Bar>, DataError> {
        let mut url = format!(
            "{}/api/v5/market/candles?instId={}&bar={}&limit={}",
            self.rest_base_url,
            Self::inst_id(symbol),
            Self::bar_code(interval),
            limit.min(300),
        );
        // OKX pages backward with `after`: returns candles with a timestamp
        // strictly earlier than the given ms value.
        if let Some(end_time) = end_time {
            url.push_str(&format!("&after={}", end_time.timestamp_millis()));
        }

        let response = self.http.get(&url).send().await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: err.to_string(),
        })?;

        let envelope: OkxEnvelope<Vec<Vec<String>>> = response.json().await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("decoding candles response: {err}"),
        })?;
        if envelope.code != "0" {
            return Err(DataError::Network { symbol: symbol.clone(), interval, message: format!("okx error {}: {}", envelope.code, envelope.msg) });
        }

        // OKX returns newest-first; only finalized candles belong in history.
        let mut bars = Vec::with_capacity(envelope.data.len());
        for row in envelope.data.iter().rev() {
            if !row_is_final(row) {
                continue;
            }
            match bar_from_row(symbol, interval, row) {
                Ok(bar) => bars.push(bar),
                Err(err) => warn!(%symbol, %interval, %err, "dropping malformed candle row"),
            }
        }
        Ok(bars)
    }

    async fn connect(&self, symbol: &Symbol, interval: Interval) -> Result<BoxStream<'static, Result<FeedEvent, DataError>>, DataError> {
        let (mut socket, _response) = tokio_tungstenite::connect_async(&self.ws_business_url).await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("websocket connect to {}: {err}", self.ws_business_url),
        })?;

        let channel = format!("candle{}", Self::bar_code(interval));
        let inst_id = Self::inst_id(symbol);
        let subscribe = serde_json::json!({
            "op": "subscribe",
            "args": [{"channel": channel, "instId": inst_id}],
        });
        socket.send(Message::Text(subscribe.to_string().into())).await.map_err(|err| DataError::Network {
            symbol: symbol.clone(),
            interval,
            message: format!("subscribe to {channel}: {err}"),
        })?;

        let symbol = symbol.clone();
        let events = socket.filter_map(move |message| {
            let symbol = symbol.clone();
            async move {
                match message {
                    Ok(Message::Text(text)) => parse_candle_frame(&symbol, interval, &text),
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                    Ok(Message::Close(frame)) => Some(Err(DataError::StreamClosed {
                        symbol: symbol.clone(),
                        interval,
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    })),
                    Ok(_) => None,
                    Err(err) => Some(Err(DataError::Network { symbol: symbol.clone(), interval, message: err.to_string() })),
                }
            }
        });

        Ok(events.boxed())
    }
}

#[derive(Debug, Deserialize)]
struct CandleFrame {
    #[serde(default)]
    data: Vec<Vec<String>>,
}

/// Returns `None` for non-data frames (subscribe acks, pongs-as-text) rather
/// than surfacing them as a stream error — only `data` frames carry bars.
fn parse_candle_frame(symbol: &Symbol, interval: Interval, text: &str) -> Option<Result<FeedEvent, DataError>> {
    let frame: CandleFrame = serde_json::from_str(text).ok()?;
    let row = frame.data.first()?;
    let is_final = row_is_final(row);
    Some(bar_from_row(symbol, interval, row).map(|bar| FeedEvent::Bar { bar, is_final }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inst_id_appends_usdt_swap_suffix() {
        assert_eq!(OkxFeed::inst_id(&Symbol::new("BTC")), "BTC-USDT-SWAP");
    }

    #[test]
    fn bar_code_uppercases_hour_and_above() {
        assert_eq!(OkxFeed::bar_code(Interval::M15), "15m");
        assert_eq!(OkxFeed::bar_code(Interval::H1), "1H");
    }

    #[test]
    fn parses_a_finalized_candle_frame() {
        let symbol = Symbol::new("BTC");
        let text = r#"{"arg":{"channel":"candle15m","instId":"BTC-USDT-SWAP"},"data":[["1700000000000","100.0","103.0","99.5","102.5","10.0","1000.0","1000.0","1"]]}"#;
        let event = parse_candle_frame(&symbol, Interval::M15, text).unwrap().unwrap();
        match event {
            FeedEvent::Bar { bar, is_final } => {
                assert!(is_final);
                assert_eq!(bar.close, Decimal::new(1025, 1));
            }
            _ => panic!("expected a bar event"),
        }
    }

    #[test]
    fn non_data_frames_are_ignored() {
        let symbol = Symbol::new("BTC");
        let text = r#"{"event":"subscribe","arg":{"channel":"candle15m","instId":"BTC-USDT-SWAP"}}"#;
        assert!(parse_candle_frame(&symbol, Interval::M15, text).is_none());
    }
}
