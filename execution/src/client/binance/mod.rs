//! USDT-margined perpetual futures client (`/fapi/v1`, `/fapi/v2`).
//!
//! Grounded on the teacher's `BinanceRequestSigner` (query string + HMAC-SHA256
//! hex digest, appended as `&signature=`), adapted from spot (`/api/v3`) to the
//! futures venue and from the teacher's `RequestSigner`/`RestRequest` trait
//! pair to a plain `reqwest` call, since this crate doesn't carry the
//! teacher's generic HTTP-transport abstraction.

mod model;

use crate::client::{AccountInfo, ExchangeClient, OpenPosition, ProtectiveStopCapability};
use crate::error::ExecutionError;
use crate::executor::PolledOrder;
use crate::order::{Order, OrderStatus, OrderType};
use async_trait::async_trait;
use chrono::Utc;
use model::{BinanceAccountV2, BinanceOrderResponse, BinancePositionRisk, BinanceTicker};
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use std::collections::HashMap;
use talus_integration::settings::BinanceSettings;
use talus_integration::signing::sign_hex;
use talus_markets::{ExchangeId, InstrumentSpec, OrderSide, Side, Symbol};

const LIVE_REST_BASE_URL: &str = "https://fapi.binance.com";

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    instruments: RwLock<HashMap<Symbol, InstrumentSpec>>,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl BinanceClient {
    pub fn new(settings: &BinanceSettings) -> Result<Self, ExecutionError> {
        let api_key = settings.api_key.clone().ok_or_else(|| ExecutionError::Auth {
            operation: "construct binance client".into(),
            message: "binance.api.key is not configured".into(),
        })?;
        let api_secret = settings.api_secret.as_ref().ok_or_else(|| ExecutionError::Auth {
            operation: "construct binance client".into(),
            message: "binance.api.secret is not configured".into(),
        })?;

        let base_url = if settings.testnet_enabled {
            settings
                .testnet_rest_base_url
                .clone()
                .unwrap_or_else(|| "https://testnet.binancefuture.com".to_string())
        } else {
            LIVE_REST_BASE_URL.to_string()
        };

        Ok(BinanceClient {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret: api_secret.expose().to_string(),
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

    /// Signs `params` (already in `key=value&...` form) with a trailing
    /// timestamp and HMAC-SHA256 signature, then issues the request.
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<serde_json::Value, ExecutionError> {
        let mut params = params;
        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = sign_hex(&self.api_secret, &query).map_err(|err| ExecutionError::Auth {
            operation: path.to_string(),
            message: err.to_string(),
        })?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|err| ExecutionError::Network {
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
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after_ms = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .map(|seconds| seconds * 1_000)
                .unwrap_or(1_000);
            return Err(ExecutionError::RateLimit { retry_after_ms });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ExecutionError::Auth {
                operation: operation.to_string(),
                message: format!("http {status}"),
            });
        }

        let body = response.text().await.map_err(|err| ExecutionError::Network {
            operation: operation.to_string(),
            symbol: None,
            message: err.to_string(),
        })?;

        if !status.is_success() {
            return Err(ExecutionError::OrderRejected {
                reason: format!("binance {operation} failed with {status}: {body}"),
            });
        }

        serde_json::from_str(&body).map_err(ExecutionError::Serialization)
    }

    fn side_param(side: OrderSide) -> &'static str {
        match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn get_account(&self) -> Result<AccountInfo, ExecutionError> {
        let value = self.signed_request(Method::GET, "/fapi/v2/account", vec![]).await?;
        let account: BinanceAccountV2 = serde_json::from_value(value)?;
        Ok(AccountInfo {
            total_equity: account.total_wallet_balance,
            available_equity: account.available_balance,
        })
    }

    async fn get_open_positions(&self, symbol: &Symbol) -> Result<Vec<OpenPosition>, ExecutionError> {
        let value = self
            .signed_request(
                Method::GET,
                "/fapi/v2/positionRisk",
                vec![("symbol".into(), symbol.compact())],
            )
            .await?;
        let positions: Vec<BinancePositionRisk> = serde_json::from_value(value)?;
        Ok(positions
            .into_iter()
            .filter(|position| !position.position_amt.is_zero())
            .map(|position| OpenPosition {
                symbol: symbol.clone(),
                side: if position.position_amt.is_sign_positive() { Side::Long } else { Side::Short },
                entry_price: position.entry_price,
                qty: position.position_amt.abs(),
            })
            .collect())
    }

    async fn place_order(&self, order: &Order) -> Result<String, ExecutionError> {
        let mut params = vec![
            ("symbol".into(), order.symbol.compact()),
            ("side".into(), Self::side_param(order.side).into()),
            (
                "type".into(),
                match order.order_type {
                    OrderType::Market => "MARKET".to_string(),
                    OrderType::Limit => "LIMIT".to_string(),
                },
            ),
            ("quantity".into(), order.qty.to_string()),
            ("newClientOrderId".into(), order.client_order_id.clone()),
        ];
        if order.reduce_only {
            params.push(("reduceOnly".into(), "true".into()));
        }
        if let OrderType::Limit = order.order_type {
            let price = order.price.ok_or_else(|| ExecutionError::OrderRejected {
                reason: "limit order missing price".into(),
            })?;
            params.push(("price".into(), price.to_string()));
            params.push(("timeInForce".into(), "GTC".into()));
        }

        let value = self.signed_request(Method::POST, "/fapi/v1/order", params).await?;
        let response: BinanceOrderResponse = serde_json::from_value(value)?;
        Ok(response.order_id.to_string())
    }

    async fn cancel_order(
        &self,
        _exchange: ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<(), ExecutionError> {
        self.signed_request(
            Method::DELETE,
            "/fapi/v1/order",
            vec![("symbol".into(), symbol.compact()), ("origClientOrderId".into(), order_id.into())],
        )
        .await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        _exchange: ExchangeId,
        symbol: &Symbol,
        order_id: &str,
    ) -> Result<PolledOrder, ExecutionError> {
        let value = self
            .signed_request(
                Method::GET,
                "/fapi/v1/order",
                vec![("symbol".into(), symbol.compact()), ("origClientOrderId".into(), order_id.into())],
            )
            .await?;
        let response: BinanceOrderResponse = serde_json::from_value(value)?;
        let status = match response.status.as_str() {
            "NEW" => OrderStatus::Submitted,
            "PARTIALLY_FILLED" => OrderStatus::Partial,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            other => {
                return Err(ExecutionError::InternalInvariantViolation(format!(
                    "unrecognized binance order status {other}"
                )))
            }
        };
        Ok(PolledOrder {
            status,
            filled_qty: response.executed_qty,
            avg_fill_price: if response.avg_price.is_zero() { None } else { Some(response.avg_price) },
        })
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<talus_data::Ticker, ExecutionError> {
        let url = format!("{}/fapi/v1/ticker/bookTicker?symbol={}", self.base_url, symbol.compact());
        let response = self.http.get(url).send().await.map_err(|err| ExecutionError::Network {
            operation: "get_ticker".into(),
            symbol: Some(symbol.clone()),
            message: err.to_string(),
        })?;
        let value = self.parse_response("get_ticker", response).await?;
        let ticker: BinanceTicker = serde_json::from_value(value)?;
        let mid = (ticker.bid_price + ticker.ask_price) / Decimal::TWO;
        talus_data::Ticker::new(symbol.clone(), ticker.bid_price, ticker.ask_price, mid, Utc::now())
            .map_err(|err| ExecutionError::InternalInvariantViolation(err.to_string()))
    }

    fn protective_stops(&self) -> Option<&dyn ProtectiveStopCapability> {
        Some(self)
    }
}

#[async_trait]
impl ProtectiveStopCapability for BinanceClient {
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

    async fn place_reduce_only_stop_market(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
        client_id: &str,
    ) -> Result<String, ExecutionError> {
        let params = vec![
            ("symbol".into(), symbol.compact()),
            ("side".into(), Self::side_param(side).into()),
            ("type".into(), "STOP_MARKET".into()),
            ("stopPrice".into(), stop_price.to_string()),
            ("quantity".into(), qty.to_string()),
            ("reduceOnly".into(), "true".into()),
            ("newClientOrderId".into(), client_id.into()),
        ];
        let value = self.signed_request(Method::POST, "/fapi/v1/order", params).await?;
        let response: BinanceOrderResponse = serde_json::from_value(value)?;
        Ok(response.order_id.to_string())
    }

    async fn cancel_reduce_only_stop_orders(&self, symbol: &Symbol) -> Result<usize, ExecutionError> {
        let value = self
            .signed_request(Method::GET, "/fapi/v1/openOrders", vec![("symbol".into(), symbol.compact())])
            .await?;
        let open_orders: Vec<BinanceOrderResponse> = serde_json::from_value(value)?;
        let stop_orders: Vec<_> = open_orders.into_iter().filter(|order| order.order_type == "STOP_MARKET").collect();
        let count = stop_orders.len();
        for order in stop_orders {
            self.cancel_order(ExchangeId::Binance, symbol, &order.client_order_id).await?;
        }
        Ok(count)
    }
}
