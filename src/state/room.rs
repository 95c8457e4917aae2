//! Room actor: the per-room serialization point.
//!
//! Every mutation of a game, whether triggered by a client action or by a
//! countdown completion, flows through one mailbox drained by a single task
//! that owns the engine. Cross-room traffic never contends.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::dto::game::GameSnapshot;
use crate::dto::ws::{GameAction, ServerEvent};
use crate::state::Connections;
use crate::state::engine::{Engine, Notify};
use crate::state::game::{Game, JoinError};
use crate::state::timer::RoomCountdown;

/// Capacity of a room's broadcast hub; laggards are skipped, not awaited.
const ROOM_EVENTS_CAPACITY: usize = 32;

/// Commands accepted by a room task.
#[derive(Debug)]
pub enum RoomCommand {
    /// A game action from a connected player.
    Action {
        /// Acting player.
        player: Uuid,
        /// The action to apply.
        action: GameAction,
    },
    /// A countdown started with this epoch ran to completion.
    CountdownElapsed {
        /// Epoch the countdown was started with.
        epoch: u64,
    },
    /// Add a player to the room, or reconnect them into their seat.
    Join {
        /// Joining player.
        player: Uuid,
        /// Display name.
        name: String,
        /// Resolves with the fresh snapshot, or the join rejection.
        reply: oneshot::Sender<Result<GameSnapshot, JoinError>>,
    },
    /// Remove a player (pre-start) or vacate their seat (post-start).
    Leave {
        /// Leaving player.
        player: Uuid,
        /// Resolves with the snapshot after removal.
        reply: oneshot::Sender<GameSnapshot>,
    },
    /// Update a seat's connected flag.
    SetConnected {
        /// Affected player.
        player: Uuid,
        /// New connected state.
        connected: bool,
    },
    /// Read the current snapshot.
    Snapshot {
        /// Resolves with the current snapshot.
        reply: oneshot::Sender<GameSnapshot>,
    },
}

/// Cheap handle to a living room task.
#[derive(Clone)]
pub struct RoomHandle {
    /// Room code.
    pub id: String,
    tx: mpsc::UnboundedSender<RoomCommand>,
    events: broadcast::Sender<ServerEvent>,
}

impl RoomHandle {
    /// Enqueue a command; a dropped room swallows it.
    pub fn send(&self, command: RoomCommand) {
        let _ = self.tx.send(command);
    }

    /// Subscribe to the room's event hub.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Join a player, waiting for the room task's verdict.
    ///
    /// `None` means the room task is gone.
    pub async fn join(&self, player: Uuid, name: String) -> Option<Result<GameSnapshot, JoinError>> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            player,
            name,
            reply,
        });
        rx.await.ok()
    }

    /// Remove a player, waiting for the resulting snapshot.
    pub async fn leave(&self, player: Uuid) -> Option<GameSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Leave { player, reply });
        rx.await.ok()
    }

    /// Read the current snapshot.
    pub async fn snapshot(&self) -> Option<GameSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply });
        rx.await.ok()
    }
}

/// Fan-out implementation backing the engine's notifications.
///
/// Room-wide events go through the broadcast hub every member socket
/// subscribes to; targeted events go straight to the player's socket writer.
struct RoomNotifier {
    events: broadcast::Sender<ServerEvent>,
    connections: Arc<Connections>,
}

impl Notify for RoomNotifier {
    fn room(&self, event: ServerEvent) {
        // No subscribers is fine; the next snapshot catches everyone up.
        let _ = self.events.send(event);
    }

    fn player(&self, player: Uuid, event: ServerEvent) {
        self.connections.send_to(player, &event);
    }
}

/// Spawn the task owning a fresh room and return a handle to it.
pub fn spawn_room(id: String, connections: Arc<Connections>, countdown_secs: u32) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(ROOM_EVENTS_CAPACITY);

    let engine = Engine::new(Game::new(id.clone()), countdown_secs);
    let notifier = RoomNotifier {
        events: events.clone(),
        connections,
    };
    let countdown = RoomCountdown::new(events.clone(), tx.clone());

    info!(room = %id, "room created");
    tokio::spawn(run_room(engine, notifier, countdown, rx));

    RoomHandle { id, tx, events }
}

async fn run_room(
    mut engine: Engine,
    notifier: RoomNotifier,
    mut countdown: RoomCountdown,
    mut rx: mpsc::UnboundedReceiver<RoomCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            RoomCommand::Action { player, action } => {
                engine.handle(&notifier, &mut countdown, player, action);
            }
            RoomCommand::CountdownElapsed { epoch } => {
                engine.countdown_elapsed(&notifier, epoch);
            }
            RoomCommand::Join {
                player,
                name,
                reply,
            } => {
                let result = engine.add_player(player, name).map(|()| {
                    notifier.room(ServerEvent::Joined {
                        game: engine.snapshot(),
                    });
                    engine.snapshot()
                });
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player, reply } => {
                engine.remove_player(&notifier, &mut countdown, player);
                notifier.room(ServerEvent::Left {
                    game: engine.snapshot(),
                });
                let _ = reply.send(engine.snapshot());
            }
            RoomCommand::SetConnected { player, connected } => {
                engine.set_connected(&notifier, &mut countdown, player, connected);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(engine.snapshot());
            }
        }
    }

    info!(room = %engine.game().id, "room task finished");
}
