use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick for the traded pair
///
/// Candles are ordered by strictly increasing timestamp and immutable once
/// appended to a window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ticker snapshot: last trade plus top-of-book quotes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
}

/// Account balance for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub available: f64,
    pub locked: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

/// Exchange-side order state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderState {
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Terminal states never transition again; filled_quantity is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

/// Intent to place an order, before the exchange assigns an id
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub kind: OrderKind,
    pub limit_price: Option<f64>,
    pub quantity: f64,
}

impl OrderRequest {
    /// Limit buy at a known entry price (the current best ask)
    pub fn limit_buy(price: f64, quantity: f64) -> Self {
        Self {
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            limit_price: Some(price),
            quantity,
        }
    }

    /// Market sell: certainty of exit over price
    pub fn market_sell(quantity: f64) -> Self {
        Self {
            side: OrderSide::Sell,
            kind: OrderKind::Market,
            limit_price: None,
            quantity,
        }
    }
}

/// An order as reported by the exchange
///
/// `filled_quantity` is cumulative and non-decreasing until a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub limit_price: Option<f64>,
    pub requested_quantity: f64,
    pub filled_quantity: f64,
    pub average_fill_price: f64,
    pub state: OrderState,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining_quantity(&self) -> f64 {
        (self.requested_quantity - self.filled_quantity).max(0.0)
    }
}

/// Immutable record of one fully closed position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub realized_pnl: f64,
    pub exit_reason: String,
}
