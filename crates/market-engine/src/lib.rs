#![deny(warnings)]

//! Game rules for the bubble market: player ledgers, trading and pricing,
//! the market-event lifecycle, action-card dispatch and scoring.
//!
//! Every engine operates on state owned by the caller (the session) and takes
//! the pieces it needs by reference, so there is exactly one copy of each
//! ledger, index and deck per game.

pub mod actions;
pub mod events;
pub mod ledger;
pub mod score;
pub mod trading;

pub use actions::{ActionCard, ActionContext, ActionDeck, CardData, CardEffect, CardId};
pub use events::{
    ActiveEvent, BubbleGrowth, ConditionalResult, DrawResult, EventEngine, EventStatus, Roll,
};
pub use ledger::{
    DividendPayment, Ledger, OwnedStock, OwnedStockRef, PlayerId, PlayerIdentity, PlayerLedger,
    StockAction,
};
pub use score::Ranking;
pub use trading::{BoardStock, BoardUpdate, Purchase, Sale, StockBoard, StockSource};

use market_core::SectorId;
use thiserror::Error;

/// Recoverable rejection of a single player action. State is left unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("player not in game: {0}")]
    UnknownPlayer(String),
    #[error("no actions left this turn")]
    NoActionsRemaining,
    /// Same trade on the same stock twice in one turn.
    #[error("you cannot {action} {stock} twice in one turn")]
    DuplicateAction { stock: String, action: StockAction },
    /// Buy after sell (or sell after buy) of the same stock in one turn.
    #[error("you cannot {action} {stock} after a {previous} on it this turn")]
    ConflictingAction {
        stock: String,
        action: StockAction,
        previous: StockAction,
    },
    #[error("insufficient funds: need ${required}, have ${available}")]
    InsufficientFunds { required: i64, available: i64 },
    #[error("invalid stock price {0}")]
    InvalidPrice(i64),
    #[error("stock not found in your portfolio: {0}")]
    StockNotOwned(String),
    #[error("stock not available on the board: {0}")]
    StockNotOnBoard(String),
    #[error("action card not in hand: {0}")]
    CardNotFound(u64),
    #[error("hand is full ({0} cards)")]
    HandFull(usize),
    #[error("action deck is empty")]
    ActionDeckEmpty,
    #[error("no upcoming events to forecast")]
    NothingToForecast,
    #[error("event deck cannot be shuffled")]
    NoEventDeck,
    #[error("{0} requires a target stock")]
    MissingTarget(String),
    /// Configuration fault: a stock names a sector with no index.
    #[error("could not find market index for sector {0}")]
    SectorNotFound(SectorId),
}
