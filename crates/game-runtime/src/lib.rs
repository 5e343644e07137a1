#![deny(warnings)]

//! Session runtime: one [`GameSession`] per room owns every ledger, index,
//! deck and the turn order, and runs the round sequence in response to player
//! requests. [`RoomRegistry`] serializes access per room.

pub mod bot;
pub mod log;
pub mod notify;
pub mod rooms;
pub mod round;
pub mod session;

pub use bot::{BotMove, BotTurn};
pub use log::{GameLog, LogEntry};
pub use notify::{ActionReply, BoardView, GameEvent, PlayerView, SessionSnapshot};
pub use rooms::{RoomRegistry, SharedSession};
pub use round::{Phase, RoundState};
pub use session::{GameSession, TurnOutcome};

use market_engine::ActionError;
use thiserror::Error;

/// Rejection of a session-level request. State is left unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("game has not started")]
    GameNotStarted,
    #[error("game already started")]
    GameAlreadyStarted,
    #[error("game is over")]
    GameOver,
    #[error("need at least {required} players, have {joined}")]
    NotEnoughPlayers { required: usize, joined: usize },
    #[error("it is not {0}'s turn")]
    NotYourTurn(String),
    #[error("player already joined: {0}")]
    DuplicatePlayer(String),
    #[error(transparent)]
    Action(#[from] ActionError),
}
