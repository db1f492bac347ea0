use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::protocol::PlayerState;
use crate::PlayerID;

/// Latest known state of every remote car, shared between the network
/// receive thread (writer) and the simulation loop (reader).
///
/// Snapshots replace the whole map: the relay view is authoritative
/// and cars absent from it are gone.
#[derive(Clone, Default)]
pub struct PlayerRegistry {
    players: Arc<RwLock<HashMap<PlayerID, PlayerState>>>,
}

impl PlayerRegistry {
    pub fn new() -> PlayerRegistry {
        PlayerRegistry::default()
    }

    pub fn replace_all(&self, players: HashMap<PlayerID, PlayerState>) {
        *self.players.write().unwrap() = players;
    }

    pub fn remove(&self, id: PlayerID) {
        self.players.write().unwrap().remove(&id);
    }

    pub fn clear(&self) {
        self.players.write().unwrap().clear();
    }

    pub fn get(&self, id: PlayerID) -> Option<PlayerState> {
        self.players.read().unwrap().get(&id).cloned()
    }

    /// All known cars, ordered by id for stable iteration.
    pub fn players(&self) -> Vec<PlayerState> {
        let mut all: Vec<PlayerState> = self.players.read().unwrap().values().cloned().collect();
        all.sort_by_key(|state| state.id);
        all
    }

    pub fn len(&self) -> usize {
        self.players.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().unwrap().is_empty()
    }
}
