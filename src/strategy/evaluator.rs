use chrono::{DateTime, Utc};

use super::{Decision, IndicatorSnapshot, SellReason};
use crate::config::{IndicatorSettings, TradingSettings};
use crate::execution::position::{Position, PositionState};

/// Tracks consecutive strictly-decreasing observations of the EMA 3-sample
/// slope across evaluation cycles.
///
/// A tie or a rise resets the streak; an undefined observation resets it
/// too. The declining-trend exit fires once `lookback` consecutive
/// decreases have been seen.
#[derive(Debug, Clone)]
pub struct SlopeTrend {
    lookback: usize,
    previous: Option<f64>,
    streak: usize,
}

impl SlopeTrend {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            previous: None,
            streak: 0,
        }
    }

    /// Feed one per-cycle slope observation
    pub fn observe(&mut self, slope: Option<f64>) {
        match (self.previous, slope) {
            (Some(prev), Some(current)) if current < prev => self.streak += 1,
            (_, Some(_)) => self.streak = 0,
            (_, None) => {
                self.streak = 0;
                self.previous = None;
                return;
            }
        }
        self.previous = slope;
    }

    pub fn is_declining(&self) -> bool {
        self.lookback > 0 && self.streak >= self.lookback
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.streak = 0;
    }
}

/// Pure signal evaluation over one cycle's indicator snapshot and the
/// current position context. Emits intent only; order submission lives in
/// the lifecycle manager.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    indicators: IndicatorSettings,
    profit_target: f64,
    max_hold_secs: u64,
}

impl SignalEvaluator {
    pub fn new(indicators: IndicatorSettings, trading: &TradingSettings) -> Self {
        Self {
            indicators,
            profit_target: trading.profit_target,
            max_hold_secs: trading.max_hold_secs,
        }
    }

    pub fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        position: &Position,
        trend: &SlopeTrend,
        now: DateTime<Utc>,
    ) -> Decision {
        match position.state {
            PositionState::Flat => {
                if self.buy_conditions_met(snapshot) {
                    Decision::Buy
                } else {
                    Decision::Hold
                }
            }
            PositionState::Held => self
                .sell_reason(snapshot, position, trend, now)
                .map(Decision::Sell)
                .unwrap_or(Decision::Hold),
            // An order is already in flight; the lifecycle manager owns it
            PositionState::Opening | PositionState::Closing => Decision::Hold,
        }
    }

    /// All conditions must hold; any undefined indicator means no signal.
    fn buy_conditions_met(&self, snapshot: &IndicatorSnapshot) -> bool {
        let strictly_positive = |v: Option<f64>| v.is_some_and(|x| x > 0.0);
        let at_least = |v: Option<f64>, threshold: f64| v.is_some_and(|x| x >= threshold);

        let t3 = self.indicators.slope_3_threshold;
        let t5 = self.indicators.slope_5_threshold;

        strictly_positive(snapshot.rsi_slopes.slope_3)
            && strictly_positive(snapshot.rsi_slopes.slope_5)
            && at_least(snapshot.ema_slopes.slope_3, t3)
            && at_least(snapshot.ema_slopes.slope_5, t5)
            && at_least(snapshot.rsi_ema_slopes.slope_3, t3)
            && at_least(snapshot.rsi_ema_slopes.slope_5, t5)
    }

    /// First matching exit wins; profit target is checked before the
    /// defensive exits.
    fn sell_reason(
        &self,
        snapshot: &IndicatorSnapshot,
        position: &Position,
        trend: &SlopeTrend,
        now: DateTime<Utc>,
    ) -> Option<SellReason> {
        if snapshot.current_price >= position.average_price + self.profit_target {
            return Some(SellReason::ProfitTarget);
        }

        if let Some(held_secs) = position.held_duration_secs(now) {
            if held_secs >= self.max_hold_secs as i64 {
                return Some(SellReason::MaxHoldExpired);
            }
        }

        if snapshot
            .rsi
            .is_some_and(|rsi| rsi > self.indicators.rsi_overbought)
        {
            return Some(SellReason::Overbought);
        }

        if trend.is_declining() {
            return Some(SellReason::DecliningTrend);
        }

        None
    }
}
