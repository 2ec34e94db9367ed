// Streaming indicator math over candle close prices.
// All functions are pure: a slice in, a same-length Vec<Option<f64>> out,
// with None wherever history is insufficient.

pub mod ema;
pub mod rsi;
pub mod rsi_ema;
pub mod slope;

pub use ema::{calculate_sma, ema_series};
pub use rsi::rsi_series;
pub use rsi_ema::rsi_ema_series;
pub use slope::{slope, slopes, Slopes};
