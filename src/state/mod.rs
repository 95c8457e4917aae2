//! Shared application state: room registry and live socket connections.

pub mod engine;
pub mod game;
pub mod placement;
pub mod registry;
pub mod room;
pub mod timer;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;
use self::registry::RoomRegistry;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to one connected player socket.
pub struct PlayerConnection {
    /// Player backing this socket.
    pub id: Uuid,
    /// Distinguishes this socket from a replacement after a reconnect.
    pub token: Uuid,
    /// Writer channel of the socket task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of live player sockets keyed by player identity.
pub struct Connections {
    sockets: DashMap<Uuid, PlayerConnection>,
}

impl Connections {
    /// Create an empty connection registry.
    pub fn new() -> Self {
        Self {
            sockets: DashMap::new(),
        }
    }

    /// Register (or replace) the socket backing a player.
    pub fn insert(&self, connection: PlayerConnection) {
        self.sockets.insert(connection.id, connection);
    }

    /// Remove a player's socket, but only if it is still the given one.
    ///
    /// Returns false when a reconnect already replaced the entry, in which
    /// case the caller must not report the player as disconnected.
    pub fn remove_token(&self, player: Uuid, token: Uuid) -> bool {
        self.sockets
            .remove_if(&player, |_, connection| connection.token == token)
            .is_some()
    }

    /// Serialize and push a payload to one player, if they are connected.
    ///
    /// Delivery failures are dropped; the player is caught up by the next
    /// room snapshot after reconnecting.
    pub fn send_to<T>(&self, player: Uuid, payload: &T)
    where
        T: ?Sized + Serialize,
    {
        let Some(connection) = self.sockets.get(&player) else {
            return;
        };

        match serde_json::to_string(payload) {
            Ok(text) => {
                let _ = connection.tx.send(Message::Text(text.into()));
            }
            Err(err) => warn!(player = %player, error = %err, "failed to serialize payload"),
        }
    }
}

impl Default for Connections {
    fn default() -> Self {
        Self::new()
    }
}

/// Central application state shared across routes and socket tasks.
pub struct AppState {
    config: AppConfig,
    connections: Arc<Connections>,
    registry: RoomRegistry,
}

impl AppState {
    /// Construct the shared state from the loaded configuration.
    pub fn new(config: AppConfig) -> SharedState {
        let connections = Arc::new(Connections::new());
        let registry = RoomRegistry::new(
            Arc::clone(&connections),
            config.countdown_secs,
            config.room_code_length,
        );
        Arc::new(Self {
            config,
            connections,
            registry,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live player sockets.
    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    /// Registry of living rooms.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}
