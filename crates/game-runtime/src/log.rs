//! Human-readable game log broadcast to players, mirrored to `tracing`.

use chrono::{DateTime, Utc};
use market_core::{signed, PriceChange};
use market_engine::Roll;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub round: u32,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GameLog {
    entries: Vec<LogEntry>,
    round: u32,
}

impl GameLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            round: 1,
        }
    }

    pub fn set_round(&mut self, round: u32) {
        self.round = round;
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(round = self.round, "{message}");
        self.entries.push(LogEntry {
            round: self.round,
            timestamp: Utc::now(),
            message,
        });
    }

    /// Records a batch of index moves, e.g.
    /// `📊 Bubble Pop - Crypto Mania: finance -5 (10→5) [Roll: 2]`.
    pub fn record_price_changes(
        &mut self,
        label: &str,
        event: &str,
        changes: &[PriceChange],
        roll: Option<Roll>,
    ) {
        let moves = changes
            .iter()
            .map(|c| {
                format!(
                    "{} {} ({}→{})",
                    c.sector,
                    signed(c.delta),
                    c.old_price,
                    c.new_price
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut msg = format!("📊 {label} - {event}: {moves}");
        if let Some(roll) = roll {
            msg.push_str(&format!(" [Roll: {roll}]"));
        }
        self.record(msg);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
