use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trendbot::config::Settings;
use trendbot::engine::Engine;
use trendbot::gateway::{CoinoneGateway, ExchangeGateway, SimulatedGateway};

/// Single-pair momentum trading bot
#[derive(Parser, Debug)]
#[command(name = "trendbot", version, about)]
struct Cli {
    /// Path to a TOML config file (without extension for layered lookup)
    #[arg(long)]
    config: Option<String>,

    /// Force dry-run mode regardless of configuration
    #[arg(long)]
    dry_run: bool,

    /// Starting quote-currency balance for dry runs
    #[arg(long, default_value_t = 1_000_000.0)]
    paper_balance: f64,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trendbot=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.dry_run {
        settings.trading.dry_run = true;
    }

    let live = CoinoneGateway::new(&settings.api, &settings.trading)?;
    let gateway: Arc<dyn ExchangeGateway> = if settings.trading.dry_run {
        tracing::info!(
            paper_balance = cli.paper_balance,
            "dry run: orders routed to the in-memory simulator"
        );
        Arc::new(SimulatedGateway::new(
            live,
            &settings.trading.currency,
            &settings.trading.symbol,
            cli.paper_balance,
        ))
    } else {
        Arc::new(live)
    };

    let mut engine = Engine::new(gateway, settings)?;
    engine.run().await
}
