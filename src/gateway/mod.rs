use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{Balance, Candle, Order, OrderRequest, Ticker};

pub mod coinone;
pub mod simulator;

pub use coinone::CoinoneGateway;
pub use simulator::SimulatedGateway;

/// Abstraction over the exchange connection for one trading pair.
///
/// `CoinoneGateway` implements this for live trading and
/// `SimulatedGateway` for dry runs. All calls are bounded by the client's
/// request timeout and classify failures as transient or fatal via
/// `GatewayError`; retry policy is owned by the caller, not the gateway.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last trade price plus top-of-book quotes
    async fn get_ticker(&self) -> Result<Ticker, GatewayError>;

    /// The most recent `count` candles, ordered oldest first
    async fn get_candles(&self, count: usize) -> Result<Vec<Candle>, GatewayError>;

    /// Balance for one asset (e.g. "KRW" or "USDT")
    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError>;

    /// Submit an order; returns the exchange's view including the assigned id
    async fn place_order(&self, request: &OrderRequest) -> Result<Order, GatewayError>;

    /// Current state and cumulative filled quantity of an order
    async fn get_order_status(&self, order_id: &str) -> Result<Order, GatewayError>;

    /// Cancel an order; `true` if the exchange accepted the cancellation
    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError>;
}
