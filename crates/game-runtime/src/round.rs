//! Turn order and round counter.

use market_core::RandomSource;
use market_engine::PlayerId;
use serde::{Deserialize, Serialize};

/// Where the session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    AwaitingTurn,
    GameEnded,
}

/// What leaving did to the turn pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Departure {
    pub was_current: bool,
    pub wrapped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub round: u32,
    pub current_turn: usize,
    pub turn_order: Vec<PlayerId>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            round: 1,
            current_turn: 0,
            turn_order: Vec::new(),
        }
    }
}

impl RoundState {
    pub fn new(turn_order: Vec<PlayerId>) -> Self {
        Self {
            turn_order,
            ..Self::default()
        }
    }

    pub fn current_player(&self) -> Option<&PlayerId> {
        self.turn_order.get(self.current_turn)
    }

    pub fn is_current(&self, player: &PlayerId) -> bool {
        self.current_player() == Some(player)
    }

    /// Moves to the next seat. Returns true when the pointer wraps to seat 0.
    pub fn advance(&mut self) -> bool {
        if self.turn_order.is_empty() {
            self.current_turn = 0;
            return true;
        }
        self.current_turn = (self.current_turn + 1) % self.turn_order.len();
        self.current_turn == 0
    }

    /// First player moves to the end; the pointer returns to seat 0.
    pub fn rotate(&mut self) {
        if self.turn_order.len() > 1 {
            self.turn_order.rotate_left(1);
        }
        self.current_turn = 0;
    }

    /// Fisher-Yates over the seating, used once at game start.
    pub fn shuffle<R: RandomSource + ?Sized>(&mut self, rng: &mut R) {
        for i in (1..self.turn_order.len()).rev() {
            let j = rng.next_int(0, i as i64) as usize;
            self.turn_order.swap(i, j);
        }
        self.current_turn = 0;
    }

    /// Drops a player's seat, keeping the pointer on the same logical player
    /// (or on the next one when the current player leaves).
    pub fn remove(&mut self, player: &PlayerId) -> Option<Departure> {
        let seat = self.turn_order.iter().position(|p| p == player)?;
        self.turn_order.remove(seat);
        let was_current = seat == self.current_turn;
        if seat < self.current_turn {
            self.current_turn -= 1;
        }
        let wrapped = was_current && self.current_turn >= self.turn_order.len();
        if wrapped {
            self.current_turn = 0;
        }
        Some(Departure {
            was_current,
            wrapped,
        })
    }
}
