//! Lifecycle of a player WebSocket connection.
//!
//! A socket first identifies the player it backs, is then wired to the
//! player's room (event forwarding plus a connected flag), and finally
//! forwards every parsable game action into the room mailbox. Unparsable or
//! unexpected frames are dropped; the room snapshot heals clients.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, GameAction, ServerEvent},
    state::{PlayerConnection, SharedState, room::RoomCommand},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let player_id = match serde_json::from_str::<ClientMessage>(&initial_message) {
        Ok(ClientMessage::Identification { id }) => id,
        Ok(ClientMessage::Unknown) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identification message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Sockets only make sense for players already seated via the REST API.
    let Some(room) = state.registry().room_of_player(player_id) else {
        warn!(player = %player_id, "socket for a player without a room");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let token = Uuid::new_v4();
    state.connections().insert(PlayerConnection {
        id: player_id,
        token,
        tx: outbound_tx.clone(),
    });

    info!(player = %player_id, room = %room.id, "player socket connected");
    room.send(RoomCommand::SetConnected {
        player: player_id,
        connected: true,
    });

    // Replay the authoritative snapshot to this socket only.
    if let Some(snapshot) = room.snapshot().await {
        send_to_socket(&outbound_tx, &ServerEvent::Joined { game: snapshot });
    }

    let forwarder = spawn_room_forwarder(
        BroadcastStream::new(room.subscribe()),
        outbound_tx.clone(),
        player_id,
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<GameAction>(&text) {
                Ok(action) => room.send(RoomCommand::Action {
                    player: player_id,
                    action,
                }),
                Err(err) => {
                    warn!(player = %player_id, error = %err, "unparsable game action dropped");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(player = %player_id, "player closed the socket");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    // Only report the disconnect if a reconnect has not already replaced
    // this socket.
    if state.connections().remove_token(player_id, token) {
        room.send(RoomCommand::SetConnected {
            player: player_id,
            connected: false,
        });
    }
    info!(player = %player_id, "player socket disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Forward room-wide events from the broadcast hub onto one socket writer.
fn spawn_room_forwarder(
    mut events: BroadcastStream<ServerEvent>,
    tx: mpsc::UnboundedSender<Message>,
    player_id: Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if !send_to_socket(&tx, &event) {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    // Skipped events are recovered by the next snapshot.
                    warn!(player = %player_id, skipped, "socket lagging behind room events");
                }
            }
        }
    })
}

/// Serialize a payload and push it onto the provided socket writer.
///
/// Returns false when the writer channel is closed.
fn send_to_socket<T>(tx: &mpsc::UnboundedSender<Message>, value: &T) -> bool
where
    T: ?Sized + serde::Serialize,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            return true;
        }
    };

    tx.send(Message::Text(payload.into())).is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
