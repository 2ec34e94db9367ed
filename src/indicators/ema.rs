/// Calculate Simple Moving Average (SMA) over the most recent `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate an Exponential Moving Average (EMA) series
///
/// Seeded by the simple average of the first `period` values, so the first
/// defined value appears at index `period - 1`; earlier slots are `None`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];

    let Some(seed) = calculate_sma(values.get(..period).unwrap_or_default(), period) else {
        return out;
    };

    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut ema = seed;
    out[period - 1] = Some(ema);

    for (i, value) in values.iter().enumerate().skip(period) {
        ema = (value - ema) * multiplier + ema;
        out[i] = Some(ema);
    }

    out
}
