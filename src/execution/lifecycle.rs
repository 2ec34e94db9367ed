use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::TradingSettings;
use crate::error::GatewayError;
use crate::gateway::ExchangeGateway;
use crate::models::{Order, OrderRequest, OrderState};

use super::retry::{with_retry, RetryPolicy};

/// Quantities below this are treated as unfilled
const FILL_EPSILON: f64 = 1e-9;

/// A working order plus how much of its fill has already been reported.
///
/// `reconciled_quantity` makes polling idempotent: each poll reports only
/// the delta between the exchange's cumulative fill and what was already
/// applied to the position, so a repeated status response never double
/// counts. `reconciled_cost` tracks the notional already reported so the
/// delta can be priced at its marginal fill price rather than the order's
/// cumulative average.
#[derive(Debug, Clone)]
pub struct OrderTracker {
    pub order: Order,
    reconciled_quantity: f64,
    reconciled_cost: f64,
}

impl OrderTracker {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            reconciled_quantity: 0.0,
            reconciled_cost: 0.0,
        }
    }

    fn unreported_fill(&self, latest: &Order) -> f64 {
        latest.filled_quantity - self.reconciled_quantity
    }

    /// Price of the newly filled delta, backed out of the exchange's
    /// cumulative average so partials at different prices keep the
    /// position's average fill-weighted.
    fn marginal_price(&self, latest: &Order, delta: f64) -> f64 {
        let cumulative_cost = latest.average_fill_price * latest.filled_quantity;
        (cumulative_cost - self.reconciled_cost) / delta
    }

    fn mark_reconciled(&mut self, latest: &Order) {
        self.reconciled_cost = latest.average_fill_price * latest.filled_quantity;
        self.reconciled_quantity = latest.filled_quantity;
    }
}

/// Confirmed change reported by one poll, in the order it must be applied
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    /// `delta` is newly confirmed quantity, never cumulative
    Fill { delta: f64, price: f64 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub events: Vec<OrderEvent>,
    /// The order reached a terminal state; the tracker can be dropped
    pub settled: bool,
}

/// Failures are split by lifecycle phase so the engine can tell a missed
/// poll (safe to retry next cycle) from a failed submit or cancel (the
/// exchange-side state is unknown, stop trading).
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("order submission failed: {0}")]
    Submit(GatewayError),
    #[error("order status poll failed: {0}")]
    Poll(GatewayError),
    #[error("order cancellation failed: {0}")]
    Cancel(GatewayError),
}

impl LifecycleError {
    /// True when the engine must stop trading rather than retry next cycle
    pub fn is_fatal(&self) -> bool {
        match self {
            // A missed poll leaves the working order intact; try again later
            LifecycleError::Poll(err) => err.is_fatal(),
            // An outright rejection means no order exists; the cycle is
            // abandoned and the next one re-evaluates. Anything else on
            // submit leaves the exchange-side state unknown.
            LifecycleError::Submit(err) => !matches!(err, GatewayError::Rejected(_)),
            LifecycleError::Cancel(_) => true,
        }
    }
}

/// Submits orders and reconciles their fills against the exchange.
///
/// All gateway calls go through the bounded retry policy. The manager never
/// touches the position; it reports confirmed `OrderEvent`s and the engine
/// applies them.
pub struct LifecycleManager {
    gateway: Arc<dyn ExchangeGateway>,
    retry: RetryPolicy,
    unfilled_timeout_secs: u64,
}

impl LifecycleManager {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        retry: RetryPolicy,
        trading: &TradingSettings,
    ) -> Self {
        Self {
            gateway,
            retry,
            unfilled_timeout_secs: trading.unfilled_timeout_secs,
        }
    }

    /// Limit buy at the given price. Exhausted retries are fatal because a
    /// submission may have landed on the exchange without a readable reply.
    pub async fn submit_buy(
        &self,
        price: f64,
        quantity: f64,
    ) -> Result<OrderTracker, LifecycleError> {
        let request = OrderRequest::limit_buy(price, quantity);
        let order = with_retry(&self.retry, "place_buy", || {
            self.gateway.place_order(&request)
        })
        .await
        .map_err(LifecycleError::Submit)?;
        Ok(OrderTracker::new(order))
    }

    /// Market sell of the full held quantity
    pub async fn submit_sell(&self, quantity: f64) -> Result<OrderTracker, LifecycleError> {
        let request = OrderRequest::market_sell(quantity);
        let order = with_retry(&self.retry, "place_sell", || {
            self.gateway.place_order(&request)
        })
        .await
        .map_err(LifecycleError::Submit)?;
        Ok(OrderTracker::new(order))
    }

    /// Reconcile one working order against the exchange.
    ///
    /// Emits the newly confirmed fill delta (if any), then a cancellation
    /// event if the order ended without filling completely. Working orders
    /// that outlive the unfilled timeout are cancelled here; the unfilled
    /// remainder is abandoned and whatever filled stands.
    pub async fn poll(
        &self,
        tracker: &mut OrderTracker,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome, LifecycleError> {
        let latest = with_retry(&self.retry, "order_status", || {
            self.gateway.get_order_status(&tracker.order.id)
        })
        .await
        .map_err(LifecycleError::Poll)?;

        let mut events = Vec::new();
        let delta = tracker.unreported_fill(&latest);
        if delta > FILL_EPSILON {
            events.push(OrderEvent::Fill {
                delta,
                price: tracker.marginal_price(&latest, delta),
            });
            tracker.mark_reconciled(&latest);
        }
        tracker.order = latest.clone();

        match latest.state {
            OrderState::Filled => Ok(PollOutcome {
                events,
                settled: true,
            }),
            OrderState::Cancelled | OrderState::Rejected => {
                events.push(OrderEvent::Cancelled);
                Ok(PollOutcome {
                    events,
                    settled: true,
                })
            }
            OrderState::Submitted | OrderState::PartiallyFilled => {
                if self.timed_out(&latest, now) {
                    self.cancel_timed_out(tracker, events).await
                } else {
                    Ok(PollOutcome {
                        events,
                        settled: false,
                    })
                }
            }
        }
    }

    fn timed_out(&self, order: &Order, now: DateTime<Utc>) -> bool {
        (now - order.submitted_at).num_seconds() >= self.unfilled_timeout_secs as i64
    }

    async fn cancel_timed_out(
        &self,
        tracker: &mut OrderTracker,
        mut events: Vec<OrderEvent>,
    ) -> Result<PollOutcome, LifecycleError> {
        tracing::warn!(
            order_id = %tracker.order.id,
            filled = tracker.order.filled_quantity,
            requested = tracker.order.requested_quantity,
            "unfilled timeout reached, cancelling order"
        );

        with_retry(&self.retry, "cancel_order", || {
            self.gateway.cancel_order(&tracker.order.id)
        })
        .await
        .map_err(LifecycleError::Cancel)?;

        // A fill can land between the status poll and the cancel; take one
        // final reading so nothing confirmed goes unreported.
        let last_known = with_retry(&self.retry, "post_cancel_status", || {
            self.gateway.get_order_status(&tracker.order.id)
        })
        .await
        .map_err(LifecycleError::Cancel)?;

        let delta = tracker.unreported_fill(&last_known);
        if delta > FILL_EPSILON {
            events.push(OrderEvent::Fill {
                delta,
                price: tracker.marginal_price(&last_known, delta),
            });
            tracker.mark_reconciled(&last_known);
        }
        tracker.order = last_known;
        tracker.order.state = OrderState::Cancelled;

        events.push(OrderEvent::Cancelled);
        Ok(PollOutcome {
            events,
            settled: true,
        })
    }
}
