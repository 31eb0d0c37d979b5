//! OKX v5 swap (perpetual futures) client.
//!
//! OKX signs `timestamp + method + path + body` with HMAC-SHA256, base64
//! encoded, and additionally requires the account passphrase on every
//! private request header (`sign_base64` in `talus-integration` mirrors the
//! digest half of this; the header assembly lives here since it's
//! venue-specific).

use crate::client::{AccountInfo, ExchangeClient, OpenPosition, ProtectiveStopCapability};
use crate::error::ExecutionError;
use crate::executor::PolledOrder;
use crate::order::{Order, OrderStatus, OrderType};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use talus_integration::settings::OkxSettings;
use talus_integration::signing::sign_base64;
use talus_markets::{ExchangeId, InstrumentSpec, OrderSide, Side, Symbol};

const LIVE_REST_BASE_URL: &str = "https://www.okx.com";

pub struct OkxClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
    simulated: bool,
    td_mode: String,
    instruments: RwLock<HashMap<Symbol, InstrumentSpec>>,
}

impl std::fmt::Debug for OkxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl OkxClient {
    pub fn new(settings: &OkxSettings) -> Result<Self, ExecutionError> {
        let api_key = settings.api_key.clone().ok_or_else(|| ExecutionError::Auth {
            operation: "construct okx client".into(),
            message: "okx.api.key is not configured".into(),
        })?;
        let api_secret = settings.api_secret.as_ref().ok_or_else(|| ExecutionError::Auth {
            operation: "construct okx client".into(),
            message: "okx.api.secret is not configured".into(),
        })?;
        let passphrase = settings.passphrase.as_ref().ok_or_else(|| ExecutionError::Auth {
            operation: "construct okx client".into(),
            message: "okx.api.passphrase is not configured".into(),
        })?;

        let base_url = if settings.demo_trading_enabled {
            settings.demo_rest_url.clone().unwrap_or_else(|| LIVE_REST_BASE_URL.to_string())
        } else {
            LIVE_REST_BASE_URL.to_string()
        };

        Ok(OkxClient {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret: api_secret.expose().to_string(),
            passphrase: passphrase.expose().to_string(),
            simulated: settings.demo_trading_enabled,
            td_mode: settings.td_mode.clone(),
            instruments: RwLock::new(HashMap::new()),
        })
    }

    pub fn register_instrument(&self, spec: InstrumentSpec) {
        self.instruments.write().insert(spec.symbol.clone(), spec);
    }

    fn instrument(&self, symbol: &Symbol) -> Result<InstrumentSpec, ExecutionError> {
        self.instruments
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidSymbol(symbol.clone()))
    }

    fn inst_id(symbol: &Symbol) -> String {
        format!("{}-USDT-SWAP", symbol.base)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ExecutionError> {
        let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let body_str = body.as_ref().map(|value| value.to_string()).unwrap_or_default();
        let prehash = format!("{timestamp}{method}{path}{body_str}");
        let signature = sign_base64(&self.api_secret, &prehash).map_err(|err| ExecutionError::Auth {
            operation: path.to_string(),
            message: err.to_string(),
        })?;

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .header("OK-ACCESS-KEY", &self.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.passphrase)
            .header("Content-Type", "application/json");
        if self.simulated {
            request = request.header("x-simulated-trading", "1");
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|err| ExecutionError::Network {
            operation: path.to_string(),
            symbol: None,
            message: err.to_string(),
        })?;
        self.parse_response(path, response).await
    }

    async fn parse_response(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ExecutionError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExecutionError::RateLimit { retry_after_ms: 1_000 });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ExecutionError::Auth { operation: operation.to_string(), message: format!("http {status}") });
        }

        let envelope: OkxEnvelope = response.json().await.map_err(|err| ExecutionError::Network {
            operation: operation.to_string(),
            symbol: None,
            message: err.to_string(),
        })?;
        if envelope.code != "0" {
            return Err(ExecutionError::OrderRejected {
                reason: format!("okx {operation} failed with code {}: {}", envelope.code, envelope.msg),
            });
        }
        Ok(envelope.data)
    }

    fn side_param(side: OrderSide) -> &'static str {
        match side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OkxEnvelope {
    code: String,
    msg: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OkxBalance {
    #[serde(rename = "totalEq")]
    total_eq: Decimal,
    #[serde(rename = "availEq")]
    avail_eq: Decimal,
}

#[derive(Debug, Deserialize)]
struct OkxPosition {
    #[serde(rename = "posSide")]
    pos_side: String,
    pos: Decimal,
    #[serde(rename = "avgPx")]
    avg_px: Decimal,
}

#[derive(Debug, Deserialize)]
struct OkxOrder {
    #[serde(rename = "ordId")]
    ord_id: String,
    #[serde(rename = "clOrdId")]
    cl_ord_id: String,
    state: String,
    #[serde(rename = "ordType")]
    ord_type: String,
    #[serde(rename = "accFillSz", default)]
    acc_fill_sz: Decimal,
    #[serde(rename = "avgPx", default)]
    avg_px: Decimal,
}

#[derive(Debug, Deserialize)]
struct OkxTicker {
    #[serde(rename = "bidPx")]
    bid_px: Decimal,
    #[serde(rename = "askPx")]
    ask_px: Decimal,
    last: Decimal,
}

#[async_trait]
impl ExchangeClient for OkxClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    async fn get_account(&self) -> Result<AccountInfo, ExecutionError> {
        let data = self.request(Method::GET, "/api/v5/account/balance", None).await?;
        let entries: Vec<OkxBalance> = serde_json::from_value(data)?;
        let entry = entries.into_iter().next().ok_or_else(|| {
            ExecutionError::InternalInvariantViolation("okx balance response was empty".into())
        })?;
        Ok(AccountInfo { total_equity: entry.total_eq, available_equity: entry.avail_eq })
    }

    async fn get_open_positions(&self, symbol: &Symbol) -> Result<Vec<OpenPosition>, ExecutionError> {
        let path = format!("/api/v5/account/positions?instId={}", Self::inst_id(symbol));
        let data = self.request(Method::GET, &path, None).await?;
        let positions: Vec<OkxPosition> = serde_json::from_value(data)?;
        Ok(positions
            .into_iter()
            .filter(|position| !position.pos.is_zero())
            .map(|position| OpenPosition {
                symbol: symbol.clone(),
                side: if position.pos_side == "long" { Side::Long } else { Side::Short },
                entry_price: position.avg_px,
                qty: position.pos.abs(),
            })
            .collect())
    }

    async fn place_order(&self, order: &Order) -> Result<String, ExecutionError> {
        let mut body = serde_json::json!({
            "instId": Self::inst_id(&order.symbol),
            "tdMode": self.td_mode,
            "side": Self::side_param(order.side),
            "ordType": match order.order_type {
                OrderType::Market => "market",
                OrderType::Limit => "limit",
            },
            "sz": order.qty.to_string(),
            "clOrdId": order.client_order_id,
            "reduceOnly": order.reduce_only,
        });
        if let OrderType::Limit = order.order_type {
            let price = order.price.ok_or_else(|| ExecutionError::OrderRejected {
                reason: "limit order missing price".into(),
            })?;
            body["px"] = serde_json::Value::String(price.to_string());
        }

        let data = self.request(Method::POST, "/api/v5/trade/order", Some(body)).await?;
        let orders: Vec<OkxOrder> = serde_json::from_value(data)?;
        let order = orders.into_iter().next().ok_or_else(|| {
            ExecutionError::InternalInvariantViolation("okx order response was empty".into())
        })?;
        Ok(order.ord_id)
    }

    async fn cancel_order(
        &self,
        _exchange: ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<(), ExecutionError> {
        let body = serde_json::json!({
            "instId": Self::inst_id(symbol),
            "clOrdId": order_id,
        });
        self.request(Method::POST, "/api/v5/trade/cancel-order", Some(body)).await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        _exchange: ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<PolledOrder, ExecutionError> {
        let path = format!("/api/v5/trade/order?instId={}&clOrdId={}", Self::inst_id(symbol), order_id);
        let data = self.request(Method::GET, &path, None).await?;
        let orders: Vec<OkxOrder> = serde_json::from_value(data)?;
        let order = orders.into_iter().next().ok_or_else(|| {
            ExecutionError::InternalInvariantViolation(format!("unknown okx order {order_id}"))
        })?;
        let status = match order.state.as_str() {
            "live" => OrderStatus::Submitted,
            "partially_filled" => OrderStatus::Partial,
            "filled" => OrderStatus::Filled,
            "canceled" => OrderStatus::Cancelled,
            other => {
                return Err(ExecutionError::InternalInvariantViolation(format!(
                    "unrecognized okx order state {other}"
                )))
            }
        };
        Ok(PolledOrder {
            status,
            filled_qty: order.acc_fill_sz,
            avg_fill_price: if order.avg_px.is_zero() { None } else { Some(order.avg_px) },
        })
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<talus_data::Ticker, ExecutionError> {
        let path = format!("/api/v5/market/ticker?instId={}", Self::inst_id(symbol));
        let data = self.request(Method::GET, &path, None).await?;
        let tickers: Vec<OkxTicker> = serde_json::from_value(data)?;
        let ticker = tickers.into_iter().next().ok_or_else(|| {
            ExecutionError::InternalInvariantViolation("okx ticker response was empty".into())
        })?;
        talus_data::Ticker::new(symbol.clone(), ticker.bid_px, ticker.ask_px, ticker.last, Utc::now())
            .map_err(|err| ExecutionError::InternalInvariantViolation(err.to_string()))
    }

    fn protective_stops(&self) -> Option<&dyn ProtectiveStopCapability> {
        Some(self)
    }
}

#[async_trait]
impl ProtectiveStopCapability for OkxClient {
    fn normalize_market_quantity(&self, symbol: &Symbol, raw_qty: Decimal) -> Result<Decimal, ExecutionError> {
        let spec = self.instrument(symbol)?;
        spec.normalize_quantity(raw_qty)
            .map_err(|err| ExecutionError::OrderRejected { reason: err.to_string() })
    }

    fn normalize_stop_price(
        &self,
        symbol: &Symbol,
        close_side: OrderSide,
        raw_price: Decimal,
    ) -> Result<Decimal, ExecutionError> {
        let spec = self.instrument(symbol)?;
        Ok(talus_markets::round_stop_price_tick(raw_price, spec.price_tick, close_side))
    }

    /// OKX exposes protective stops only through the algo-order endpoint
    /// (`/api/v5/trade/order-algo`), distinct from the regular order
    /// endpoint used for entries and exits.
    async fn place_reduce_only_stop_market(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
        client_id: &str,
    ) -> Result<String, ExecutionError> {
        let body = serde_json::json!({
            "instId": Self::inst_id(symbol),
            "tdMode": self.td_mode,
            "side": Self::side_param(side),
            "ordType": "conditional",
            "sz": qty.to_string(),
            "slTriggerPx": stop_price.to_string(),
            "slOrdPx": "-1",
            "reduceOnly": true,
            "algoClOrdId": client_id,
        });
        let data = self.request(Method::POST, "/api/v5/trade/order-algo", Some(body)).await?;
        #[derive(Deserialize)]
        struct AlgoOrder {
            #[serde(rename = "algoId")]
            algo_id: String,
        }
        let orders: Vec<AlgoOrder> = serde_json::from_value(data)?;
        let order = orders.into_iter().next().ok_or_else(|| {
            ExecutionError::InternalInvariantViolation("okx algo order response was empty".into())
        })?;
        Ok(order.algo_id)
    }

    /// Dedups order ids before dispatching cancels across the algo and
    /// regular order endpoints, since a stop can in principle have been
    /// placed through either path during venue failover.
    async fn cancel_reduce_only_stop_orders(&self, symbol: &Symbol) -> Result<usize, ExecutionError> {
        let path = format!("/api/v5/trade/orders-algo-pending?instId={}&ordType=conditional", Self::inst_id(symbol));
        let data = self.request(Method::GET, &path, None).await?;
        #[derive(Deserialize)]
        struct PendingAlgo {
            #[serde(rename = "algoId")]
            algo_id: String,
        }
        let pending: Vec<PendingAlgo> = serde_json::from_value(data)?;
        let mut seen = std::collections::HashSet::new();
        let ids: Vec<String> = pending.into_iter().map(|algo| algo.algo_id).filter(|id| seen.insert(id.clone())).collect();
        let count = ids.len();
        if !ids.is_empty() {
            let body = serde_json::json!(ids
                .iter()
                .map(|id| serde_json::json!({"instId": Self::inst_id(symbol), "algoId": id}))
                .collect::<Vec<_>>());
            self.request(Method::POST, "/api/v5/trade/cancel-algos", Some(body)).await?;
        }
        Ok(count)
    }
}
