//! Keyed store of living rooms plus the player-to-room reverse index.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use rand::distr::Alphanumeric;
use uuid::Uuid;

use crate::state::Connections;
use crate::state::room::{RoomHandle, spawn_room};

/// Registry owning every room handle and the reverse player index.
///
/// Rooms are never evicted here; a room with no members simply sits idle
/// until the process restarts.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    players: DashMap<Uuid, String>,
    connections: Arc<Connections>,
    countdown_secs: u32,
    code_length: usize,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(connections: Arc<Connections>, countdown_secs: u32, code_length: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            players: DashMap::new(),
            connections,
            countdown_secs,
            code_length,
        }
    }

    /// Spawn a fresh room under a new unique code.
    pub fn create_room(&self) -> RoomHandle {
        loop {
            let code = random_code(self.code_length);
            if self.rooms.contains_key(&code) {
                continue;
            }
            let handle = spawn_room(
                code.clone(),
                Arc::clone(&self.connections),
                self.countdown_secs,
            );
            self.rooms.insert(code, handle.clone());
            return handle;
        }
    }

    /// Look up a room by its code.
    pub fn room(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.get(id).map(|entry| entry.value().clone())
    }

    /// Look up the room a player currently occupies.
    pub fn room_of_player(&self, player: Uuid) -> Option<RoomHandle> {
        let room_id = self.players.get(&player)?.value().clone();
        self.room(&room_id)
    }

    /// Point the reverse index at the room a player joined.
    pub fn register_player(&self, player: Uuid, room_id: &str) {
        self.players.insert(player, room_id.to_string());
    }

    /// Drop a player from the reverse index.
    pub fn unregister_player(&self, player: Uuid) {
        self.players.remove(&player);
    }

    /// Number of living rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn random_code(length: usize) -> String {
    let rng = rand::rng();
    rng.sample_iter(Alphanumeric)
        .take(length)
        .map(|byte| (byte as char).to_ascii_uppercase())
        .collect()
}
