//! Outbound notifications, the transport reply shape and player-facing
//! round summaries.

use crate::log::LogEntry;
use crate::round::Phase;
use crate::SessionError;
use market_core::{signed, IndexEffect, MarketIndexes, PriceChange, Timing};
use market_engine::score::Ranking;
use market_engine::{
    ActionCard, ActiveEvent, BoardStock, BoardUpdate, ConditionalResult, DividendPayment,
    EventStatus, OwnedStock, PlayerId, PlayerIdentity,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One player's public state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub identity: PlayerIdentity,
    pub cash: i64,
    pub net_worth: i64,
    pub actions_remaining: u32,
    pub portfolio: Vec<OwnedStock>,
    pub hand: Vec<ActionCard>,
}

/// A board stock with its live price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub stock: BoardStock,
    pub price: i64,
    pub owned: usize,
}

/// Full state of a session, sent at game start and on request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub room: String,
    pub phase: Phase,
    pub round: u32,
    pub max_rounds: u32,
    pub turn_order: Vec<PlayerId>,
    pub current_player: Option<PlayerId>,
    pub players: Vec<PlayerView>,
    pub board: Vec<BoardView>,
    pub indexes: MarketIndexes,
    pub active_events: Vec<ActiveEvent>,
    pub visual_effects: Vec<IndexEffect>,
}

/// State changes broadcast to every participant of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    PlayerJoined {
        player: PlayerId,
        identity: PlayerIdentity,
    },
    PlayerLeft {
        player: PlayerId,
    },
    GameStarted {
        snapshot: Box<SessionSnapshot>,
    },
    TurnStarted {
        player: PlayerId,
        round: u32,
    },
    ActionsUpdated {
        player: PlayerId,
        actions_remaining: u32,
    },
    CashUpdated {
        cash: BTreeMap<PlayerId, i64>,
    },
    PortfolioUpdated {
        player: PlayerId,
        portfolio: Vec<OwnedStock>,
    },
    HandUpdated {
        player: PlayerId,
        hand: Vec<ActionCard>,
    },
    StockOwnershipUpdated {
        counts: BTreeMap<String, usize>,
    },
    NetWorthUpdated {
        net_worths: BTreeMap<PlayerId, i64>,
    },
    IndexesUpdated {
        indexes: MarketIndexes,
    },
    DividendsPaid {
        round: u32,
        payments: Vec<DividendPayment>,
    },
    EventDrawn {
        event: ActiveEvent,
        results: Vec<PriceChange>,
    },
    EventTriggered {
        result: ConditionalResult,
    },
    BoardUpdated {
        update: BoardUpdate,
    },
    RoundStarted {
        round: u32,
        summary: String,
        indexes: MarketIndexes,
        active_events: Vec<ActiveEvent>,
        visual_effects: Vec<IndexEffect>,
        recent_log: Vec<LogEntry>,
    },
    GameEnded {
        rankings: Vec<Ranking>,
        winners: Vec<Ranking>,
        message: String,
    },
}

/// Transport shape for the result of a single player request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionReply {
    pub fn ok<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn failure(err: &SessionError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            data: None,
        }
    }

    /// Converts an operation result, describing success with `describe`.
    pub fn from_result<T: Serialize>(
        result: &Result<T, SessionError>,
        describe: impl FnOnce(&T) -> String,
    ) -> Self {
        match result {
            Ok(v) => Self::ok(describe(v), v),
            Err(e) => Self::failure(e),
        }
    }
}

fn effect_list(effects: &[IndexEffect]) -> String {
    effects
        .iter()
        .map(|e| format!("{} {}", e.sector, signed(e.delta)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn change_list(changes: &[PriceChange]) -> String {
    changes
        .iter()
        .map(|c| format!("{} {}", c.sector, signed(c.delta)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Player-facing text announcing a new round.
pub fn round_summary(
    round: u32,
    previous: &[ConditionalResult],
    drawn: Option<&ActiveEvent>,
    active: &[ActiveEvent],
    dividends: &[DividendPayment],
) -> String {
    let mut msg = format!("🎲 Round {round} begins!");

    if !previous.is_empty() {
        msg.push_str("\n\n📊 Previous Round Results:");
        for r in previous {
            if r.triggered {
                msg.push_str(&format!(
                    "\n💥 {} popped! {}",
                    r.event.name(),
                    change_list(&r.results)
                ));
            } else {
                msg.push_str(&format!("\n✓ {} held (remains active)", r.event.name()));
            }
        }
    }

    if let Some(event) = drawn {
        let def = &event.definition;
        msg.push_str(&format!("\n\n📰 New Event: {}", def.name));
        if !def.description.is_empty() {
            msg.push_str(&format!("\n{}", def.description));
        }
        let growing = def
            .conditional
            .as_ref()
            .is_some_and(|c| c.timing == Timing::End);
        if !def.effects.is_empty() {
            msg.push_str(&format!(
                "\n📊 {}{}",
                effect_list(&def.effects),
                if growing { " (each round)" } else { "" }
            ));
        }
        if let Some(cond) = &def.conditional {
            let when = match cond.timing {
                Timing::End => "At the end of this round",
                Timing::Start => "At the start of next round",
            };
            msg.push_str(&format!(
                "\n⚠️ {}, {} chance bubble pops: {}",
                when,
                cond.trigger.odds_percent(),
                effect_list(&cond.effects)
            ));
        }
    }

    let live: Vec<&ActiveEvent> = active
        .iter()
        .filter(|e| e.status != EventStatus::Resolved)
        .collect();
    if !live.is_empty() {
        msg.push_str("\n\n🎪 Active Events:");
        for e in live {
            msg.push_str(&format!("\n  • {}", e.name()));
            if e.rounds_active > 0 {
                msg.push_str(&format!(" (Round {})", e.rounds_active));
            }
        }
    }

    if !dividends.is_empty() {
        msg.push_str("\n\n💰 Dividends:");
        for p in dividends {
            msg.push_str(&format!("\n  {} +${}", p.player, p.total));
        }
    }
    msg
}
