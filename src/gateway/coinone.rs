use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha512;
use uuid::Uuid;

use super::ExchangeGateway;
use crate::config::{ApiSettings, TradingSettings};
use crate::error::GatewayError;
use crate::models::{
    Balance, Candle, Order, OrderKind, OrderRequest, OrderSide, OrderState, Ticker,
};

type HmacSha512 = Hmac<Sha512>;

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Coinone REST API v2 client for a single trading pair.
///
/// Private calls carry a base64-encoded JSON payload signed with
/// HMAC-SHA512 in the `X-COINONE-PAYLOAD` / `X-COINONE-SIGNATURE` headers.
/// Requests are paced by an in-process rate limiter; error responses are
/// classified into the transient/fatal taxonomy consumed by the retry
/// policy upstream.
#[derive(Clone)]
pub struct CoinoneGateway {
    client: Client,
    base_url: String,
    symbol: String,
    interval: String,
    access_token: String,
    secret_key: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

// Error codes the exchange documents as credential problems
const AUTH_ERROR_CODES: &[&str] = &["4", "11", "12", "40"];

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(default)]
    last: String,
    #[serde(default)]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookLevel {
    price: String,
}

#[derive(Debug, Deserialize)]
struct OrderbookResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(default)]
    bid: Vec<OrderbookLevel>,
    #[serde(default)]
    ask: Vec<OrderbookLevel>,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(default)]
    candles: Vec<CandleRow>,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
    #[serde(rename = "orderId", default)]
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderInfoResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    qty: String,
    #[serde(rename = "filledQty", default)]
    filled_qty: String,
    #[serde(rename = "avgPrice", default)]
    avg_price: Option<String>,
    #[serde(rename = "isAsk", default)]
    is_ask: u8,
    #[serde(rename = "orderedAt", default)]
    ordered_at: i64,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
}

impl CoinoneGateway {
    pub fn new(api: &ApiSettings, trading: &TradingSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(api.timeout_secs))
            .build()?;

        let rpm = NonZeroU32::new(api.rate_limit_rpm.max(1))
            .ok_or_else(|| anyhow::anyhow!("rate_limit_rpm must be positive"))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            symbol: trading.symbol.to_lowercase(),
            interval: trading.candle_interval.clone(),
            access_token: api.access_token.clone().unwrap_or_default(),
            secret_key: api.secret_key.clone().unwrap_or_default(),
            rate_limiter,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn post_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut payload: serde_json::Value,
    ) -> Result<T, GatewayError> {
        if self.access_token.is_empty() || self.secret_key.is_empty() {
            return Err(GatewayError::Auth(
                "missing API credentials (COINONE_ACCESS_TOKEN / COINONE_SECRET_KEY)".to_string(),
            ));
        }

        self.rate_limiter.until_ready().await;

        payload["access_token"] = json!(self.access_token);
        payload["nonce"] = json!(Uuid::new_v4().to_string());

        let encoded =
            base64::engine::general_purpose::STANDARD.encode(payload.to_string().as_bytes());
        let signature = self.sign(&encoded)?;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-COINONE-PAYLOAD", &encoded)
            .header("X-COINONE-SIGNATURE", signature)
            .json(&payload)
            .send()
            .await?;

        Self::decode(response).await
    }

    fn sign(&self, encoded_payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha512::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| GatewayError::Auth(format!("invalid secret key: {e}")))?;
        mac.update(encoded_payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited(
                "exchange request rate exceeded".to_string(),
            ));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Auth(format!("http status {status}")));
        }
        if status.is_server_error() {
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message: "exchange server error".to_string(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("http status {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }

    /// Map the exchange's in-body error code to the error taxonomy.
    fn check_error_code(
        code: &Option<String>,
        message: Option<&str>,
    ) -> Result<(), GatewayError> {
        let Some(code) = code else { return Ok(()) };
        if code == "0" {
            return Ok(());
        }

        let message = message.unwrap_or("unknown exchange error");
        if AUTH_ERROR_CODES.contains(&code.as_str()) {
            Err(GatewayError::Auth(format!("code {code}: {message}")))
        } else {
            Err(GatewayError::Rejected(format!("code {code}: {message}")))
        }
    }

    fn parse_f64(value: &str, field: &str) -> Result<f64, GatewayError> {
        value
            .parse::<f64>()
            .map_err(|_| GatewayError::Parse(format!("non-numeric {field}: {value:?}")))
    }

    fn parse_timestamp_ms(ms: i64) -> Result<DateTime<Utc>, GatewayError> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| GatewayError::Parse(format!("invalid timestamp {ms}")))
    }

    fn map_order_state(status: &str) -> OrderState {
        match status {
            "filled" => OrderState::Filled,
            "partially_filled" => OrderState::PartiallyFilled,
            "cancelled" | "canceled" => OrderState::Cancelled,
            "rejected" => OrderState::Rejected,
            _ => OrderState::Submitted,
        }
    }
}

#[async_trait]
impl ExchangeGateway for CoinoneGateway {
    async fn get_ticker(&self) -> Result<Ticker, GatewayError> {
        let ticker: TickerResponse = self
            .get_json("/ticker/", &[("currency", self.symbol.clone())])
            .await?;
        Self::check_error_code(&ticker.error_code, None)?;

        let orderbook: OrderbookResponse = self
            .get_json("/orderbook/", &[("currency", self.symbol.clone())])
            .await?;
        Self::check_error_code(&orderbook.error_code, None)?;

        let bid = orderbook
            .bid
            .first()
            .map(|l| Self::parse_f64(&l.price, "bid"))
            .transpose()?
            .unwrap_or(0.0);
        let ask = orderbook
            .ask
            .first()
            .map(|l| Self::parse_f64(&l.price, "ask"))
            .transpose()?
            .unwrap_or(0.0);

        Ok(Ticker {
            last: Self::parse_f64(&ticker.last, "last")?,
            bid,
            ask,
            volume: Self::parse_f64(&ticker.volume, "volume")?,
        })
    }

    async fn get_candles(&self, count: usize) -> Result<Vec<Candle>, GatewayError> {
        let response: CandlesResponse = self
            .get_json(
                "/chart/",
                &[
                    ("currency", self.symbol.clone()),
                    ("interval", self.interval.clone()),
                    ("size", count.min(500).to_string()),
                ],
            )
            .await?;
        Self::check_error_code(&response.error_code, None)?;

        let mut candles = Vec::with_capacity(response.candles.len());
        for row in response.candles {
            candles.push(Candle {
                timestamp: Self::parse_timestamp_ms(row.timestamp)?,
                open: Self::parse_f64(&row.open, "open")?,
                high: Self::parse_f64(&row.high, "high")?,
                low: Self::parse_f64(&row.low, "low")?,
                close: Self::parse_f64(&row.close, "close")?,
                volume: Self::parse_f64(&row.volume, "volume")?,
            });
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        let body: serde_json::Value = self.post_signed("/v2/account/balance/", json!({})).await?;

        let code = body
            .get("errorCode")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let message = body.get("errorMsg").and_then(|v| v.as_str());
        Self::check_error_code(&code, message)?;

        let entry = body.get(asset.to_lowercase()).ok_or_else(|| {
            GatewayError::Parse(format!("no balance entry for asset {asset:?}"))
        })?;
        let avail = entry
            .get("avail")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::Parse("missing avail field".to_string()))?;
        let total = entry
            .get("balance")
            .and_then(|v| v.as_str())
            .unwrap_or(avail);

        let available = Self::parse_f64(avail, "avail")?;
        let total = Self::parse_f64(total, "balance")?;
        Ok(Balance {
            available,
            locked: (total - available).max(0.0),
        })
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order, GatewayError> {
        let is_ask = if request.side == OrderSide::Sell { 1 } else { 0 };
        let (path, payload) = match request.kind {
            OrderKind::Limit => {
                let price = request.limit_price.ok_or_else(|| {
                    GatewayError::Rejected("limit order without a limit price".to_string())
                })?;
                (
                    "/v2/order/",
                    json!({
                        "currency": self.symbol,
                        "price": price.to_string(),
                        "qty": request.quantity.to_string(),
                        "is_ask": is_ask,
                    }),
                )
            }
            OrderKind::Market => (
                "/v2/order/market/",
                json!({
                    "currency": self.symbol,
                    "qty": request.quantity.to_string(),
                    "is_ask": is_ask,
                }),
            ),
        };

        let response: PlaceOrderResponse = self.post_signed(path, payload).await?;
        Self::check_error_code(&response.error_code, response.error_msg.as_deref())?;

        let order_id = response
            .order_id
            .ok_or_else(|| GatewayError::Parse("no order id in response".to_string()))?;

        tracing::info!(
            order_id = %order_id,
            side = ?request.side,
            kind = ?request.kind,
            quantity = request.quantity,
            price = ?request.limit_price,
            "order submitted"
        );

        Ok(Order {
            id: order_id,
            side: request.side,
            kind: request.kind,
            limit_price: request.limit_price,
            requested_quantity: request.quantity,
            filled_quantity: 0.0,
            average_fill_price: 0.0,
            state: OrderState::Submitted,
            submitted_at: Utc::now(),
        })
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Order, GatewayError> {
        let response: OrderInfoResponse = self
            .post_signed(
                "/v2/order/query_order/",
                json!({ "order_id": order_id, "currency": self.symbol }),
            )
            .await?;
        Self::check_error_code(&response.error_code, response.error_msg.as_deref())?;

        let limit_price = response
            .price
            .as_deref()
            .map(|p| Self::parse_f64(p, "price"))
            .transpose()?;
        let average_fill_price = response
            .avg_price
            .as_deref()
            .map(|p| Self::parse_f64(p, "avgPrice"))
            .transpose()?
            .unwrap_or(0.0);

        Ok(Order {
            id: order_id.to_string(),
            side: if response.is_ask == 1 {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            },
            kind: if limit_price.is_some() {
                OrderKind::Limit
            } else {
                OrderKind::Market
            },
            limit_price,
            requested_quantity: Self::parse_f64(&response.qty, "qty")?,
            filled_quantity: Self::parse_f64(&response.filled_qty, "filledQty")?,
            average_fill_price,
            state: Self::map_order_state(&response.status),
            submitted_at: Self::parse_timestamp_ms(response.ordered_at)?,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError> {
        let response: CancelResponse = self
            .post_signed(
                "/v2/order/cancel/",
                json!({ "order_id": order_id, "currency": self.symbol }),
            )
            .await?;
        Self::check_error_code(&response.error_code, response.error_msg.as_deref())?;

        tracing::info!(order_id = %order_id, "order cancelled");
        Ok(true)
    }
}
