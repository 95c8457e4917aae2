//! Room lifecycle operations backing the REST routes.
//!
//! These helpers only speak to rooms through their mailboxes; every game
//! mutation stays serialized inside the room task.

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::game::GameSnapshot,
    error::ServiceError,
    state::{SharedState, game::JoinError, room::RoomHandle},
};

/// Create a fresh room and seat the creator in it.
pub async fn create_room(
    state: &SharedState,
    player: Uuid,
    name: String,
) -> Result<GameSnapshot, ServiceError> {
    let handle = state.registry().create_room();
    info!(room = %handle.id, player = %player, "room created");
    join_handle(state, &handle, player, name).await
}

/// Seat a player in an existing room, or reconnect them into their seat.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    player: Uuid,
    name: String,
) -> Result<GameSnapshot, ServiceError> {
    let handle = require_room(state, room_id)?;
    join_handle(state, &handle, player, name).await
}

/// Remove a player from a room and clear the reverse index.
pub async fn leave_room(
    state: &SharedState,
    room_id: &str,
    player: Uuid,
) -> Result<GameSnapshot, ServiceError> {
    let handle = require_room(state, room_id)?;
    let snapshot = handle
        .leave(player)
        .await
        .ok_or_else(|| ServiceError::RoomClosed(room_id.to_string()))?;

    state.registry().unregister_player(player);
    info!(room = %room_id, player = %player, "player left room");
    Ok(snapshot)
}

/// Read a room's current snapshot.
pub async fn read_room(state: &SharedState, room_id: &str) -> Result<GameSnapshot, ServiceError> {
    let handle = require_room(state, room_id)?;
    handle
        .snapshot()
        .await
        .ok_or_else(|| ServiceError::RoomClosed(room_id.to_string()))
}

fn require_room(state: &SharedState, room_id: &str) -> Result<RoomHandle, ServiceError> {
    state
        .registry()
        .room(room_id)
        .ok_or_else(|| ServiceError::RoomNotFound(room_id.to_string()))
}

async fn join_handle(
    state: &SharedState,
    handle: &RoomHandle,
    player: Uuid,
    name: String,
) -> Result<GameSnapshot, ServiceError> {
    match handle.join(player, name).await {
        Some(Ok(snapshot)) => {
            state.registry().register_player(player, &handle.id);
            info!(room = %handle.id, player = %player, "player joined room");
            Ok(snapshot)
        }
        Some(Err(JoinError::AlreadyStarted)) => {
            Err(ServiceError::RoomAlreadyStarted(handle.id.clone()))
        }
        None => Err(ServiceError::RoomClosed(handle.id.clone())),
    }
}
