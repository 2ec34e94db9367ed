use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use trendbot::error::GatewayError;
use trendbot::gateway::ExchangeGateway;
use trendbot::models::{
    Balance, Candle, Order, OrderKind, OrderRequest, OrderState, Ticker,
};
use trendbot::Settings;

/// Scripted gateway for engine tests: market data is set per cycle, order
/// status responses are queued, submissions and cancellations are recorded.
#[derive(Default)]
pub struct MockGateway {
    candles: Mutex<Vec<Candle>>,
    ticker: Mutex<Option<Ticker>>,
    balance: Mutex<Option<Balance>>,
    statuses: Mutex<VecDeque<Result<Order, GatewayError>>>,
    status_calls: AtomicU32,
    placements: Mutex<Vec<OrderRequest>>,
    cancellations: Mutex<Vec<String>>,
    next_order: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        *self.candles.lock().unwrap() = candles;
    }

    pub fn set_ticker(&self, last: f64) {
        *self.ticker.lock().unwrap() = Some(Ticker {
            last,
            bid: last - 1.0,
            ask: last + 1.0,
            volume: 10_000.0,
        });
    }

    pub fn set_balance(&self, available: f64) {
        *self.balance.lock().unwrap() = Some(Balance {
            available,
            locked: 0.0,
        });
    }

    pub fn push_status(&self, response: Result<Order, GatewayError>) {
        self.statuses.lock().unwrap().push_back(response);
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn placements(&self) -> Vec<OrderRequest> {
        self.placements.lock().unwrap().clone()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.cancellations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_ticker(&self) -> Result<Ticker, GatewayError> {
        self.ticker
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Network("no ticker scripted".to_string()))
    }

    async fn get_candles(&self, _count: usize) -> Result<Vec<Candle>, GatewayError> {
        Ok(self.candles.lock().unwrap().clone())
    }

    async fn get_balance(&self, _asset: &str) -> Result<Balance, GatewayError> {
        self.balance
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Network("no balance scripted".to_string()))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order, GatewayError> {
        self.placements.lock().unwrap().push(request.clone());
        let n = self.next_order.fetch_add(1, Ordering::SeqCst);
        Ok(Order {
            id: format!("ord-{n}"),
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

    async fn get_order_status(&self, _order_id: &str) -> Result<Order, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Network("no status scripted".to_string())))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError> {
        self.cancellations.lock().unwrap().push(order_id.to_string());
        Ok(true)
    }
}

/// An order status as the exchange would report it
#[allow(clippy::too_many_arguments)]
pub fn order_status(
    id: &str,
    side: trendbot::models::OrderSide,
    kind: OrderKind,
    state: OrderState,
    requested: f64,
    filled: f64,
    avg_price: f64,
    age_minutes: i64,
) -> Order {
    Order {
        id: id.to_string(),
        side,
        kind,
        limit_price: if kind == OrderKind::Limit {
            Some(avg_price.max(1.0))
        } else {
            None
        },
        requested_quantity: requested,
        filled_quantity: filled,
        average_fill_price: avg_price,
        state,
        submitted_at: Utc::now() - Duration::minutes(age_minutes),
    }
}

/// Candle window from a sequence of closes, one hour apart, newest last
pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc::now() - Duration::hours(closes.len() as i64);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + Duration::hours(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10_000.0,
        })
        .collect()
}

/// Closes that oscillate first (so losses exist) then rise steadily, which
/// pushes RSI, EMA, and RSI-EMA into a sustained uptrend.
pub fn uptrend_closes() -> Vec<f64> {
    let mut closes = Vec::with_capacity(60);
    for i in 0..20 {
        let dip = if i % 2 == 1 { 2.0 } else { 0.0 };
        closes.push(1000.0 + i as f64 * 0.5 - dip);
    }
    let mut last = *closes.last().unwrap();
    for _ in 20..60 {
        last += 3.0;
        closes.push(last);
    }
    closes
}

/// Settings tuned for tests: tiny slope thresholds so the scripted uptrend
/// qualifies, fast retries, and per-test data paths.
pub fn test_settings(max_retries: u32) -> Settings {
    let dir = std::env::temp_dir().join(format!("trendbot-test-{}", uuid::Uuid::new_v4()));
    let mut settings = Settings::default();
    settings.api.max_retries = max_retries;
    settings.api.retry_base_delay_ms = 1;
    settings.api.rate_limit_floor_ms = 1;
    settings.indicators.slope_3_threshold = 0.0001;
    settings.indicators.slope_5_threshold = 0.0001;
    settings.engine.ledger_path = dir.join("trades.jsonl").to_string_lossy().into_owned();
    settings.engine.event_log_path = dir.join("events.jsonl").to_string_lossy().into_owned();
    settings
}
