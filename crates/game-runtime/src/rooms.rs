//! Room registry. Each room holds one session behind its own lock, so requests
//! for a room are applied one at a time while rooms proceed independently.

use crate::session::GameSession;
use market_catalog::{Catalog, GameRules};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub type SharedSession = Arc<Mutex<GameSession>>;

pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, SharedSession>>,
    catalog: Catalog,
    rules: GameRules,
}

impl RoomRegistry {
    /// New rooms are created with clones of `catalog` and `rules`.
    pub fn new(catalog: Catalog, rules: GameRules) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            catalog,
            rules,
        }
    }

    /// Returns the room's session, creating it on first use.
    pub fn open(&self, room: &str) -> SharedSession {
        if let Some(s) = self.rooms.read().get(room) {
            return Arc::clone(s);
        }
        let mut rooms = self.rooms.write();
        Arc::clone(rooms.entry(room.to_string()).or_insert_with(|| {
            info!(room, "room opened");
            Arc::new(Mutex::new(GameSession::new(
                room,
                self.catalog.clone(),
                self.rules.clone(),
            )))
        }))
    }

    pub fn get(&self, room: &str) -> Option<SharedSession> {
        self.rooms.read().get(room).cloned()
    }

    /// Drops the room. Handles already held keep the session alive.
    pub fn close(&self, room: &str) -> bool {
        let closed = self.rooms.write().remove(room).is_some();
        if closed {
            info!(room, "room closed");
        }
        closed
    }

    /// Runs `f` with exclusive access to the room's session, opening it if needed.
    pub fn with_room<T>(&self, room: &str, f: impl FnOnce(&mut GameSession) -> T) -> T {
        let session = self.open(room);
        let mut guard = session.lock();
        f(&mut guard)
    }

    pub fn rooms(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }
}
