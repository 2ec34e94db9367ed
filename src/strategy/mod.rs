// Signal evaluation: indicator snapshots in, tagged decisions out.
// Nothing in this module touches orders or the position directly.

pub mod evaluator;
pub mod snapshot;

pub use evaluator::{SignalEvaluator, SlopeTrend};
pub use snapshot::IndicatorSnapshot;

/// The evaluator's verdict for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Buy,
    Sell(SellReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellReason {
    ProfitTarget,
    MaxHoldExpired,
    Overbought,
    DecliningTrend,
}

impl SellReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SellReason::ProfitTarget => "profit_target",
            SellReason::MaxHoldExpired => "max_hold",
            SellReason::Overbought => "overbought",
            SellReason::DecliningTrend => "declining_trend",
        }
    }
}

impl std::fmt::Display for SellReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
