use super::ema::ema_series;
use super::rsi::rsi_series;

/// Calculate the RSI-EMA composite: an EMA smoothing of the RSI series
///
/// The EMA runs over the defined RSI tail, so the first defined value
/// requires `rsi_period + ema_period` candles. Output is aligned one-to-one
/// with the input prices.
pub fn rsi_ema_series(prices: &[f64], rsi_period: usize, ema_period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];

    let rsi = rsi_series(prices, rsi_period);
    let defined: Vec<f64> = rsi.iter().flatten().copied().collect();
    if defined.is_empty() {
        return out;
    }

    // RSI becomes defined at index `rsi_period`; map the smoothed values back
    let smoothed = ema_series(&defined, ema_period);
    for (j, value) in smoothed.into_iter().enumerate() {
        out[rsi_period + j] = value;
    }

    out
}
