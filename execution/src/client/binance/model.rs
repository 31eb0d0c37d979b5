use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountV2 {
    #[serde(rename = "totalWalletBalance")]
    pub total_wallet_balance: Decimal,
    #[serde(rename = "availableBalance")]
    pub available_balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinancePositionRisk {
    #[serde(rename = "positionAmt")]
    pub position_amt: Decimal,
    #[serde(rename = "entryPrice")]
    pub entry_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: Decimal,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceTicker {
    #[serde(rename = "bidPrice")]
    pub bid_price: Decimal,
    #[serde(rename = "askPrice")]
    pub ask_price: Decimal,
}
