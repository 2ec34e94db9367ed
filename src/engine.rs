use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::execution::lifecycle::{LifecycleError, LifecycleManager, OrderEvent, OrderTracker};
use crate::execution::position::Position;
use crate::execution::retry::{with_retry, RetryPolicy};
use crate::gateway::ExchangeGateway;
use crate::ledger::{BotEvent, EventLog, TradeLedger};
use crate::models::{Order, OrderSide};
use crate::strategy::{Decision, IndicatorSnapshot, SignalEvaluator, SlopeTrend};

/// The single control loop: one cycle polls any working order, rebuilds
/// indicators from fresh candles, evaluates the signal rules, and acts on
/// the decision. Nothing else mutates the position or submits orders, so
/// every state transition happens in cycle order.
pub struct Engine {
    gateway: Arc<dyn ExchangeGateway>,
    settings: Settings,
    retry: RetryPolicy,
    evaluator: SignalEvaluator,
    trend: SlopeTrend,
    lifecycle: LifecycleManager,
    position: Position,
    pending: Option<OrderTracker>,
    /// No new entries before this instant (post-trade cooldown)
    cooldown_until: Option<DateTime<Utc>>,
    ledger: TradeLedger,
    events: EventLog,
}

impl Engine {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, settings: Settings) -> anyhow::Result<Self> {
        let retry = RetryPolicy::from_settings(&settings.api);
        let evaluator = SignalEvaluator::new(settings.indicators.clone(), &settings.trading);
        let trend = SlopeTrend::new(settings.indicators.decline_lookback);
        let lifecycle = LifecycleManager::new(gateway.clone(), retry.clone(), &settings.trading);
        let ledger = TradeLedger::open(&settings.engine.ledger_path)?;
        let events = EventLog::open(&settings.engine.event_log_path)?;

        Ok(Self {
            gateway,
            settings,
            retry,
            evaluator,
            trend,
            lifecycle,
            position: Position::new(),
            pending: None,
            cooldown_until: None,
            ledger,
            events,
        })
    }

    /// Run cycles at the configured interval until interrupted or a fatal
    /// error stops trading.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.engine.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            symbol = %self.settings.trading.symbol,
            currency = %self.settings.trading.currency,
            dry_run = self.settings.trading.dry_run,
            interval_secs = self.settings.engine.poll_interval_secs,
            "engine started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    if let Err(err) = self.run_cycle(now).await {
                        self.report_fatal(&err, now);
                        return Err(err);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.log_summary();
        Ok(())
    }

    /// One evaluation cycle. Transient trouble is logged and skipped;
    /// returned errors are fatal and stop the engine.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        // Reconcile the working order before anything else so the position
        // reflects every confirmed fill this cycle acts on.
        if self.pending.is_some() {
            if !self.reconcile_pending(now).await? {
                return Ok(());
            }
        }

        let candle_count = self.settings.trading.candle_count;
        let fetched = with_retry(&self.retry, "get_candles", || {
            self.gateway.get_candles(candle_count)
        })
        .await;
        let candles = match fetched {
            Ok(candles) => candles,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("fetching candles"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "candle fetch failed, skipping cycle");
                self.record_cycle_error(now, &format!("candle fetch failed: {err}"));
                return Ok(());
            }
        };

        let Some(snapshot) = IndicatorSnapshot::from_candles(&candles, &self.settings.indicators)
        else {
            tracing::warn!("empty candle window, skipping cycle");
            return Ok(());
        };

        self.trend.observe(snapshot.ema_slopes.slope_3);
        self.position.observe_price(snapshot.current_price);

        let decision = self.evaluator.evaluate(&snapshot, &self.position, &self.trend, now);
        tracing::debug!(
            price = snapshot.current_price,
            rsi = ?snapshot.rsi,
            ema_slope_3 = ?snapshot.ema_slopes.slope_3,
            ?decision,
            position = ?self.position.state,
            "cycle evaluated"
        );

        match decision {
            Decision::Hold => Ok(()),
            Decision::Buy => {
                if self.in_cooldown(now) {
                    tracing::debug!("buy signal suppressed by post-trade cooldown");
                    return Ok(());
                }
                self.log_signal(now, "buy", snapshot.current_price);
                self.open_position(now).await
            }
            Decision::Sell(reason) => {
                self.log_signal(now, reason.as_str(), snapshot.current_price);
                self.close_position(reason.as_str(), now).await
            }
        }
    }

    /// Poll the working order and apply its confirmed events. Returns
    /// `false` when the cycle should stop early (poll failed transiently).
    async fn reconcile_pending(&mut self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let Some(mut tracker) = self.pending.take() else {
            return Ok(true);
        };

        let polled = self.lifecycle.poll(&mut tracker, now).await;
        let outcome = match polled {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                self.pending = Some(tracker);
                return Err(anyhow::Error::new(err).context("reconciling working order"));
            }
            Err(err) => {
                tracing::warn!(error = %err, order_id = %tracker.order.id, "order poll failed, retrying next cycle");
                self.record_cycle_error(now, &format!("order poll failed: {err}"));
                self.pending = Some(tracker);
                return Ok(false);
            }
        };

        let order = tracker.order.clone();
        for event in &outcome.events {
            self.apply_order_event(&order, event, now)?;
        }

        if outcome.settled {
            // A cancelled entry with zero fill leaves the position flat and
            // the engine free to hunt a new signal next cycle.
            self.pending = None;
        } else {
            self.pending = Some(tracker);
        }
        Ok(true)
    }

    fn apply_order_event(
        &mut self,
        order: &Order,
        event: &OrderEvent,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        match (order.side, event) {
            (OrderSide::Buy, OrderEvent::Fill { delta, price }) => {
                self.position.apply_buy_fill(*price, *delta, now)?;
                self.log_fill(now, &order.id, *delta, *price);
            }
            (OrderSide::Buy, OrderEvent::Cancelled) => {
                self.position.buy_cancelled()?;
                self.log_cancel(now, &order.id, order.filled_quantity);
            }
            (OrderSide::Sell, OrderEvent::Fill { delta, price }) => {
                let record = self.position.apply_sell_fill(
                    *price,
                    *delta,
                    self.settings.trading.fee_rate,
                    now,
                )?;
                self.log_fill(now, &order.id, *delta, *price);
                if let Some(record) = record {
                    self.ledger.record(record).context("writing trade record")?;
                    self.trend.reset();
                    self.cooldown_until = Some(
                        now + chrono::Duration::seconds(
                            self.settings.trading.restart_delay_secs as i64,
                        ),
                    );
                }
            }
            (OrderSide::Sell, OrderEvent::Cancelled) => {
                self.position.sell_cancelled()?;
                self.log_cancel(now, &order.id, order.filled_quantity);
            }
        }
        Ok(())
    }

    /// Size and submit the entry order: a limit buy at the current best ask,
    /// spending available quote balance up to the notional cap.
    async fn open_position(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let fetched = with_retry(&self.retry, "get_ticker", || self.gateway.get_ticker()).await;
        let ticker = match fetched {
            Ok(ticker) => ticker,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("fetching ticker for entry"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "ticker fetch failed, entry deferred");
                return Ok(());
            }
        };
        if ticker.ask <= 0.0 {
            tracing::warn!(ask = ticker.ask, "no usable ask price, entry deferred");
            return Ok(());
        }

        let currency = self.settings.trading.currency.clone();
        let fetched = with_retry(&self.retry, "get_balance", || {
            self.gateway.get_balance(&currency)
        })
        .await;
        let balance = match fetched {
            Ok(balance) => balance,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("fetching balance for entry"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "balance fetch failed, entry deferred");
                return Ok(());
            }
        };

        let notional = balance
            .available
            .min(self.settings.trading.max_order_amount);
        let quantity = notional / ticker.ask;
        if quantity <= 0.0 {
            tracing::warn!(available = balance.available, "no funds for entry");
            return Ok(());
        }

        let submitted = self.lifecycle.submit_buy(ticker.ask, quantity).await;
        let tracker = match submitted {
            Ok(tracker) => tracker,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("submitting entry order"));
            }
            Err(err) => {
                // Rejected for this cycle only; the next cycle re-evaluates
                tracing::warn!(error = %err, "entry order not accepted");
                self.record_cycle_error(now, &format!("entry submission failed: {err}"));
                return Ok(());
            }
        };
        self.position.buy_submitted()?;

        self.log_submitted(now, &tracker.order.id, "buy", quantity, Some(ticker.ask));
        self.pending = Some(tracker);
        Ok(())
    }

    /// Market sell of the full held quantity
    async fn close_position(&mut self, reason: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let quantity = self.position.quantity;
        let submitted = self.lifecycle.submit_sell(quantity).await;
        let tracker = match submitted {
            Ok(tracker) => tracker,
            Err(err) if err.is_fatal() => {
                return Err(anyhow::Error::new(err).context("submitting exit order"));
            }
            Err(err) => {
                tracing::warn!(error = %err, "exit order not accepted");
                self.record_cycle_error(now, &format!("exit submission failed: {err}"));
                return Ok(());
            }
        };
        self.position.sell_submitted(quantity, reason.to_string())?;

        self.log_submitted(now, &tracker.order.id, "sell", quantity, None);
        self.pending = Some(tracker);
        Ok(())
    }

    fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    fn report_fatal(&mut self, err: &anyhow::Error, now: DateTime<Utc>) {
        tracing::error!(
            error = %err,
            position = ?self.position.state,
            quantity = self.position.quantity,
            pending_order = ?self.pending.as_ref().map(|t| t.order.id.clone()),
            "fatal error, trading stopped"
        );
        self.record_cycle_error(now, &format!("fatal: {err}"));
        self.log_summary();
    }

    fn log_summary(&self) {
        let summary = self.ledger.summary();
        tracing::info!(
            trades = summary.trade_count,
            wins = summary.winning_trades,
            total_pnl = summary.total_pnl,
            position = ?self.position.state,
            "session summary"
        );
    }

    fn log_signal(&mut self, now: DateTime<Utc>, decision: &str, price: f64) {
        if let Err(err) = self.events.append(&BotEvent::Signal {
            timestamp: now,
            decision: decision.to_string(),
            price,
        }) {
            tracing::warn!(error = %err, "event log write failed");
        }
    }

    fn log_submitted(
        &mut self,
        now: DateTime<Utc>,
        order_id: &str,
        side: &str,
        quantity: f64,
        price: Option<f64>,
    ) {
        if let Err(err) = self.events.append(&BotEvent::OrderSubmitted {
            timestamp: now,
            order_id: order_id.to_string(),
            side: side.to_string(),
            quantity,
            price,
        }) {
            tracing::warn!(error = %err, "event log write failed");
        }
    }

    fn log_fill(&mut self, now: DateTime<Utc>, order_id: &str, delta: f64, price: f64) {
        if let Err(err) = self.events.append(&BotEvent::Fill {
            timestamp: now,
            order_id: order_id.to_string(),
            delta,
            price,
        }) {
            tracing::warn!(error = %err, "event log write failed");
        }
    }

    fn log_cancel(&mut self, now: DateTime<Utc>, order_id: &str, filled_quantity: f64) {
        if let Err(err) = self.events.append(&BotEvent::OrderCancelled {
            timestamp: now,
            order_id: order_id.to_string(),
            filled_quantity,
        }) {
            tracing::warn!(error = %err, "event log write failed");
        }
    }

    fn record_cycle_error(&mut self, now: DateTime<Utc>, message: &str) {
        if let Err(err) = self.events.append(&BotEvent::CycleError {
            timestamp: now,
            message: message.to_string(),
        }) {
            tracing::warn!(error = %err, "event log write failed");
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn has_pending_order(&self) -> bool {
        self.pending.is_some()
    }

    pub fn completed_trades(&self) -> &[crate::models::TradeRecord] {
        self.ledger.trades()
    }
}
