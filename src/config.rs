use anyhow::Context;
use serde::Deserialize;

/// Exchange API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Minimum backoff once the gateway reports a rate limit
    pub rate_limit_floor_ms: u64,
    /// Requests per minute allowed against the exchange
    pub rate_limit_rpm: u32,
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.coinone.co.kr".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            rate_limit_floor_ms: 2_000,
            rate_limit_rpm: 90,
            access_token: None,
            secret_key: None,
        }
    }
}

/// Trading pair and lifecycle settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    /// Traded asset (e.g. "USDT")
    pub symbol: String,
    /// Quote currency (e.g. "KRW")
    pub currency: String,
    /// Candle interval requested from the exchange
    pub candle_interval: String,
    /// Candles fetched per cycle to rebuild indicator history
    pub candle_count: usize,
    /// Fixed currency offset over average entry for the profit exit
    pub profit_target: f64,
    /// Maximum holding duration before a forced exit (seconds)
    pub max_hold_secs: u64,
    /// Unfilled-order timeout before cancellation (seconds)
    pub unfilled_timeout_secs: u64,
    /// Cooldown after a completed round trip before hunting a new entry
    pub restart_delay_secs: u64,
    /// Safety cap on order notional (quote currency)
    pub max_order_amount: f64,
    /// Flat per-side fee rate applied to realized P&L
    pub fee_rate: f64,
    /// Route orders to the in-memory simulator instead of the live gateway
    pub dry_run: bool,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbol: "USDT".to_string(),
            currency: "KRW".to_string(),
            candle_interval: "1h".to_string(),
            candle_count: 100,
            profit_target: 4.0,
            max_hold_secs: 86_400,
            unfilled_timeout_secs: 600,
            restart_delay_secs: 3_600,
            max_order_amount: 10_000_000.0,
            fee_rate: 0.0002,
            dry_run: true,
        }
    }
}

/// Indicator and signal-rule settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub rsi_period: usize,
    pub ema_period: usize,
    pub rsi_overbought: f64,
    /// Threshold for the 3-sample slope of EMA and RSI-EMA
    pub slope_3_threshold: f64,
    /// Threshold for the 5-sample slope of EMA and RSI-EMA
    pub slope_5_threshold: f64,
    /// Consecutive strictly-decreasing EMA slope_3 observations that
    /// trigger the declining-trend exit
    pub decline_lookback: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_period: 20,
            rsi_overbought: 70.0,
            slope_3_threshold: 0.3,
            slope_5_threshold: 0.2,
            decline_lookback: 3,
        }
    }
}

/// Control loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Seconds between evaluation cycles (also the order polling interval)
    pub poll_interval_secs: u64,
    /// Trade ledger path (JSON lines, append-only)
    pub ledger_path: String,
    /// Structured event log path (JSON lines, append-only)
    pub event_log_path: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            ledger_path: "data/trades.jsonl".to_string(),
            event_log_path: "data/events.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub trading: TradingSettings,
    pub indicators: IndicatorSettings,
    pub engine: EngineSettings,
}

impl Settings {
    /// Load settings from an optional TOML file layered with `TRENDBOT_*`
    /// environment variables. An explicitly named file must exist; the
    /// default lookup may be absent. API credentials come only from the
    /// environment, never from files.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(
                config::File::with_name(path.unwrap_or("config/default"))
                    .required(path.is_some()),
            )
            .add_source(
                config::Environment::with_prefix("TRENDBOT")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut settings: Settings = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        settings.api.access_token = std::env::var("COINONE_ACCESS_TOKEN").ok();
        settings.api.secret_key = std::env::var("COINONE_SECRET_KEY").ok();

        Ok(settings)
    }
}
