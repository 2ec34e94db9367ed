use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ExchangeGateway;

/// Tolerance for balance checks; sizing to the full balance can overshoot
/// by a rounding ulp.
const BALANCE_EPSILON: f64 = 1e-6;
use crate::error::GatewayError;
use crate::models::{
    Balance, Candle, Order, OrderKind, OrderRequest, OrderSide, OrderState, Ticker,
};

/// Dry-run gateway: real market data, simulated everything else.
///
/// Ticker and candle requests pass through to the inner gateway so signals
/// see the live market. Orders and balances live in memory. Limit buys rest
/// until the last trade price touches the limit, then fill in full at the
/// limit price; market sells fill immediately at the last trade price. No
/// partial fills are simulated.
pub struct SimulatedGateway<G> {
    inner: G,
    quote_asset: String,
    base_asset: String,
    state: Mutex<SimulatorState>,
}

struct SimulatorState {
    balances: HashMap<String, Balance>,
    orders: HashMap<String, Order>,
}

impl<G: ExchangeGateway> SimulatedGateway<G> {
    /// `starting_quote` seeds the quote-currency balance the bot trades from.
    pub fn new(inner: G, quote_asset: &str, base_asset: &str, starting_quote: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(
            quote_asset.to_uppercase(),
            Balance {
                available: starting_quote,
                locked: 0.0,
            },
        );
        balances.insert(
            base_asset.to_uppercase(),
            Balance {
                available: 0.0,
                locked: 0.0,
            },
        );

        Self {
            inner,
            quote_asset: quote_asset.to_uppercase(),
            base_asset: base_asset.to_uppercase(),
            state: Mutex::new(SimulatorState {
                balances,
                orders: HashMap::new(),
            }),
        }
    }

    fn fill_buy(state: &mut SimulatorState, order: &mut Order, price: f64, assets: (&str, &str)) {
        let (quote, base) = assets;
        order.filled_quantity = order.requested_quantity;
        order.average_fill_price = price;
        order.state = OrderState::Filled;

        let cost = price * order.requested_quantity;
        if let Some(balance) = state.balances.get_mut(quote) {
            balance.locked = (balance.locked - cost).max(0.0);
        }
        if let Some(balance) = state.balances.get_mut(base) {
            balance.available += order.requested_quantity;
        }
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for SimulatedGateway<G> {
    async fn get_ticker(&self) -> Result<Ticker, GatewayError> {
        self.inner.get_ticker().await
    }

    async fn get_candles(&self, count: usize) -> Result<Vec<Candle>, GatewayError> {
        self.inner.get_candles(count).await
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .get(&asset.to_uppercase())
            .cloned()
            .unwrap_or(Balance {
                available: 0.0,
                locked: 0.0,
            }))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order, GatewayError> {
        let ticker = self.inner.get_ticker().await?;
        let mut state = self.state.lock().await;

        let mut order = Order {
            id: format!("sim-{}", Uuid::new_v4()),
            side: request.side,
            kind: request.kind,
            limit_price: request.limit_price,
            requested_quantity: request.quantity,
            filled_quantity: 0.0,
            average_fill_price: 0.0,
            state: OrderState::Submitted,
            submitted_at: Utc::now(),
        };

        match (request.side, request.kind) {
            (OrderSide::Buy, OrderKind::Limit) => {
                let limit = request.limit_price.ok_or_else(|| {
                    GatewayError::Rejected("limit order without a limit price".to_string())
                })?;
                let cost = limit * request.quantity;
                let quote = state
                    .balances
                    .get_mut(&self.quote_asset)
                    .filter(|b| b.available + BALANCE_EPSILON >= cost)
                    .ok_or_else(|| {
                        GatewayError::Rejected("insufficient quote balance".to_string())
                    })?;
                quote.available -= cost;
                quote.locked += cost;

                // Fills immediately if the market is already at or below the limit
                if ticker.last <= limit {
                    Self::fill_buy(
                        &mut state,
                        &mut order,
                        limit,
                        (&self.quote_asset, &self.base_asset),
                    );
                }
            }
            (OrderSide::Sell, OrderKind::Market) => {
                let base = state
                    .balances
                    .get_mut(&self.base_asset)
                    .filter(|b| b.available + BALANCE_EPSILON >= request.quantity)
                    .ok_or_else(|| {
                        GatewayError::Rejected("insufficient base balance".to_string())
                    })?;
                base.available -= request.quantity;

                order.filled_quantity = request.quantity;
                order.average_fill_price = ticker.last;
                order.state = OrderState::Filled;

                let proceeds = ticker.last * request.quantity;
                if let Some(quote) = state.balances.get_mut(&self.quote_asset) {
                    quote.available += proceeds;
                }
            }
            (side, kind) => {
                return Err(GatewayError::Rejected(format!(
                    "unsupported order shape: {side:?} {kind:?}"
                )));
            }
        }

        tracing::info!(
            order_id = %order.id,
            side = ?order.side,
            state = ?order.state,
            "simulated order placed"
        );

        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Order, GatewayError> {
        // Check resting limit buys against the current market before answering
        let ticker = self.inner.get_ticker().await?;
        let mut state = self.state.lock().await;

        let mut order = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown order {order_id}")))?;

        if order.state == OrderState::Submitted && order.side == OrderSide::Buy {
            if let Some(limit) = order.limit_price {
                if ticker.last <= limit {
                    Self::fill_buy(
                        &mut state,
                        &mut order,
                        limit,
                        (&self.quote_asset, &self.base_asset),
                    );
                    state.orders.insert(order.id.clone(), order.clone());
                }
            }
        }

        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().await;

        let mut order = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown order {order_id}")))?;

        if order.state.is_terminal() {
            return Ok(false);
        }

        // Unlock whatever the resting remainder still reserves
        if order.side == OrderSide::Buy {
            if let Some(limit) = order.limit_price {
                let reserved = limit * order.remaining_quantity();
                if let Some(quote) = state.balances.get_mut(&self.quote_asset) {
                    quote.locked = (quote.locked - reserved).max(0.0);
                    quote.available += reserved;
                }
            }
        }

        order.state = OrderState::Cancelled;
        state.orders.insert(order.id.clone(), order);
        Ok(true)
    }
}
