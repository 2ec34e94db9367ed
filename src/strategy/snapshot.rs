use chrono::{DateTime, Utc};

use crate::config::IndicatorSettings;
use crate::indicators::{ema_series, rsi_ema_series, rsi_series, slopes, Slopes};
use crate::models::Candle;

/// All indicator values the evaluator consumes, computed once per cycle
/// from the candle window taken at cycle start.
///
/// Undefined values mean insufficient history and are carried as `None`;
/// consumers treat them as "no signal", never as zero.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Close of the most recent candle
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub ema: Option<f64>,
    pub rsi_ema: Option<f64>,
    pub rsi_slopes: Slopes,
    pub ema_slopes: Slopes,
    pub rsi_ema_slopes: Slopes,
}

impl IndicatorSnapshot {
    /// Build a snapshot from an ordered candle window. Returns `None` only
    /// for an empty window; short windows produce a snapshot with undefined
    /// indicator values.
    pub fn from_candles(candles: &[Candle], config: &IndicatorSettings) -> Option<Self> {
        let last = candles.last()?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let rsi = rsi_series(&closes, config.rsi_period);
        let ema = ema_series(&closes, config.ema_period);
        let rsi_ema = rsi_ema_series(&closes, config.rsi_period, config.ema_period);

        Some(Self {
            timestamp: last.timestamp,
            current_price: last.close,
            rsi: rsi.last().copied().flatten(),
            ema: ema.last().copied().flatten(),
            rsi_ema: rsi_ema.last().copied().flatten(),
            rsi_slopes: slopes(&rsi),
            ema_slopes: slopes(&ema),
            rsi_ema_slopes: slopes(&rsi_ema),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_empty_window_yields_no_snapshot() {
        let config = IndicatorSettings::default();
        assert!(IndicatorSnapshot::from_candles(&[], &config).is_none());
    }

    #[test]
    fn test_short_window_yields_undefined_indicators() {
        let config = IndicatorSettings::default();
        let candles = candles_from_closes(&[100.0, 101.0, 102.0]);

        let snapshot = IndicatorSnapshot::from_candles(&candles, &config).unwrap();
        assert_eq!(snapshot.current_price, 102.0);
        assert!(snapshot.rsi.is_none());
        assert!(snapshot.ema.is_none());
        assert!(snapshot.rsi_ema.is_none());
        assert!(snapshot.rsi_slopes.slope_3.is_none());
    }

    #[test]
    fn test_full_window_defines_everything() {
        let config = IndicatorSettings::default();
        let closes: Vec<f64> = (0..60).map(|i| 1000.0 + i as f64).collect();
        let candles = candles_from_closes(&closes);

        let snapshot = IndicatorSnapshot::from_candles(&candles, &config).unwrap();
        assert!(snapshot.rsi.is_some());
        assert!(snapshot.ema.is_some());
        assert!(snapshot.rsi_ema.is_some());
        assert!(snapshot.rsi_slopes.slope_5.is_some());
        assert!(snapshot.ema_slopes.slope_5.is_some());
        assert!(snapshot.rsi_ema_slopes.slope_5.is_some());
        assert_eq!(snapshot.current_price, 1059.0);
    }
}
