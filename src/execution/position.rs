use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TradeRecord;

/// Quantities below this are treated as fully liquidated
const QTY_EPSILON: f64 = 1e-9;

/// Lifecycle of the single tracked position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionState {
    /// No position and no working entry order
    Flat,
    /// Buy order submitted, nothing confirmed filled yet
    Opening,
    /// Holding a confirmed quantity
    Held,
    /// Sell order submitted for the held quantity
    Closing,
}

/// The single open position, advanced only by confirmed fill/cancel events
///
/// Signals never mutate this directly; the order lifecycle manager reports
/// confirmed deltas and the engine applies them here, so the tracked state
/// cannot drift ahead of the exchange's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub state: PositionState,
    /// Fill-quantity-weighted average of all buy fills in this position
    pub average_price: f64,
    pub quantity: f64,
    /// Set on the first confirmed buy fill
    pub opened_at: Option<DateTime<Utc>>,
    /// Highest price observed while holding
    pub max_price_seen: f64,
    cost_basis: f64,
    sold_quantity: f64,
    sale_proceeds: f64,
    exit_reason: Option<String>,
}

impl Position {
    pub fn new() -> Self {
        Self {
            state: PositionState::Flat,
            average_price: 0.0,
            quantity: 0.0,
            opened_at: None,
            max_price_seen: 0.0,
            cost_basis: 0.0,
            sold_quantity: 0.0,
            sale_proceeds: 0.0,
            exit_reason: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    /// A buy order was accepted by the exchange
    pub fn buy_submitted(&mut self) -> anyhow::Result<()> {
        if self.state != PositionState::Flat {
            anyhow::bail!("cannot open: position state is {:?}", self.state);
        }
        self.state = PositionState::Opening;
        Ok(())
    }

    /// A sell order was accepted by the exchange
    pub fn sell_submitted(&mut self, quantity: f64, exit_reason: String) -> anyhow::Result<()> {
        if self.state != PositionState::Held {
            anyhow::bail!("cannot close: position state is {:?}", self.state);
        }
        if quantity > self.quantity + QTY_EPSILON {
            anyhow::bail!(
                "sell quantity {} exceeds position quantity {}",
                quantity,
                self.quantity
            );
        }
        self.state = PositionState::Closing;
        self.exit_reason = Some(exit_reason);
        Ok(())
    }

    /// Apply a confirmed buy fill delta (partial or full)
    pub fn apply_buy_fill(
        &mut self,
        price: f64,
        quantity_delta: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !matches!(self.state, PositionState::Opening | PositionState::Held) {
            anyhow::bail!("unexpected buy fill in state {:?}", self.state);
        }
        if quantity_delta <= 0.0 {
            return Ok(());
        }

        self.cost_basis += price * quantity_delta;
        self.quantity += quantity_delta;
        self.average_price = self.cost_basis / self.quantity;

        if self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
        self.max_price_seen = self.max_price_seen.max(price);
        self.state = PositionState::Held;

        tracing::info!(
            price,
            quantity_delta,
            average_price = self.average_price,
            total_quantity = self.quantity,
            "buy fill applied"
        );

        Ok(())
    }

    /// Apply a confirmed sell fill delta. Returns a `TradeRecord` once the
    /// position is fully liquidated, at which point the position resets to
    /// `Flat`.
    pub fn apply_sell_fill(
        &mut self,
        price: f64,
        quantity_delta: f64,
        fee_rate: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<TradeRecord>> {
        if self.state != PositionState::Closing {
            anyhow::bail!("unexpected sell fill in state {:?}", self.state);
        }
        if quantity_delta <= 0.0 {
            return Ok(None);
        }
        if quantity_delta > self.quantity + QTY_EPSILON {
            anyhow::bail!(
                "sell fill {} exceeds held quantity {}",
                quantity_delta,
                self.quantity
            );
        }

        self.quantity -= quantity_delta;
        self.sold_quantity += quantity_delta;
        self.sale_proceeds += price * quantity_delta;

        if self.quantity > QTY_EPSILON {
            return Ok(None);
        }

        let exit_price = self.sale_proceeds / self.sold_quantity;
        let fees = self.sale_proceeds * fee_rate;
        let record = TradeRecord {
            entry_price: self.average_price,
            exit_price,
            quantity: self.sold_quantity,
            entry_time: self.opened_at.unwrap_or(now),
            exit_time: now,
            realized_pnl: (exit_price - self.average_price) * self.sold_quantity - fees,
            exit_reason: self
                .exit_reason
                .take()
                .unwrap_or_else(|| "unknown".to_string()),
        };

        tracing::info!(
            entry = record.entry_price,
            exit = record.exit_price,
            pnl = record.realized_pnl,
            reason = %record.exit_reason,
            "position closed"
        );

        *self = Position::new();
        Ok(Some(record))
    }

    /// The entry order was cancelled. Any already-filled portion stays in
    /// the position; a zero-fill cancel returns to `Flat`.
    pub fn buy_cancelled(&mut self) -> anyhow::Result<()> {
        if self.state != PositionState::Opening && self.state != PositionState::Held {
            anyhow::bail!("unexpected buy cancellation in state {:?}", self.state);
        }
        if self.quantity <= QTY_EPSILON {
            *self = Position::new();
        } else {
            self.state = PositionState::Held;
        }
        Ok(())
    }

    /// The exit order was cancelled while a remainder is still held
    pub fn sell_cancelled(&mut self) -> anyhow::Result<()> {
        if self.state != PositionState::Closing {
            anyhow::bail!("unexpected sell cancellation in state {:?}", self.state);
        }
        if self.quantity <= QTY_EPSILON {
            anyhow::bail!("sell cancelled but no quantity remains");
        }
        self.state = PositionState::Held;
        self.exit_reason = None;
        Ok(())
    }

    /// Track the high-water mark while holding
    pub fn observe_price(&mut self, price: f64) {
        if self.state == PositionState::Held || self.state == PositionState::Closing {
            self.max_price_seen = self.max_price_seen.max(price);
        }
    }

    /// Seconds the position has been held as of `now`
    pub fn held_duration_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.opened_at.map(|t| (now - t).num_seconds())
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}
