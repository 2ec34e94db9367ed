use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TradeRecord;

/// Append-only record of completed round trips, one JSON object per line.
///
/// Write-once: prior sessions' records stay in the file but are never read
/// back; the in-memory list covers only the current session and feeds the
/// shutdown summary. Each record is flushed as soon as the position closes
/// so a crash never loses a completed trade.
pub struct TradeLedger {
    path: PathBuf,
    file: File,
    trades: Vec<TradeRecord>,
}

impl TradeLedger {
    /// Opens the ledger for append, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating ledger directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {} for append", path.display()))?;

        Ok(Self {
            path,
            file,
            trades: Vec::new(),
        })
    }

    pub fn record(&mut self, trade: TradeRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&trade)?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("appending to {}", self.path.display()))?;
        self.file.flush()?;

        tracing::info!(
            entry_price = trade.entry_price,
            exit_price = trade.exit_price,
            quantity = trade.quantity,
            realized_pnl = trade.realized_pnl,
            exit_reason = %trade.exit_reason,
            "trade recorded"
        );
        self.trades.push(trade);
        Ok(())
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn summary(&self) -> LedgerSummary {
        let wins = self
            .trades
            .iter()
            .filter(|t| t.realized_pnl > 0.0)
            .count();
        LedgerSummary {
            trade_count: self.trades.len(),
            winning_trades: wins,
            total_pnl: self.trades.iter().map(|t| t.realized_pnl).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
}

/// Notable engine occurrences, written to a separate JSONL stream for
/// after-the-fact inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BotEvent {
    Signal {
        timestamp: DateTime<Utc>,
        decision: String,
        price: f64,
    },
    OrderSubmitted {
        timestamp: DateTime<Utc>,
        order_id: String,
        side: String,
        quantity: f64,
        price: Option<f64>,
    },
    Fill {
        timestamp: DateTime<Utc>,
        order_id: String,
        delta: f64,
        price: f64,
    },
    OrderCancelled {
        timestamp: DateTime<Utc>,
        order_id: String,
        filled_quantity: f64,
    },
    CycleError {
        timestamp: DateTime<Utc>,
        message: String,
    },
}

pub struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating event log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {} for append", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn append(&mut self, event: &BotEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("appending to {}", self.path.display()))?;
        self.file.flush()?;
        Ok(())
    }
}
