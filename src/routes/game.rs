//! Room lifecycle routes. Player identity travels in the `clientId` header,
//! matching what the web client sends with every request.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::game::{GameSnapshot, JoinRequest},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes handling room creation, lookup, join and leave.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/game/create", post(create_room))
        .route("/game/{id}", get(read_room))
        .route("/game/join/{id}", post(join_room))
        .route("/game/leave/{id}", post(leave_room))
}

#[utoipa::path(
    post,
    path = "/game/create",
    tag = "game",
    request_body = JoinRequest,
    params(("clientId" = String, Header, description = "Identity of the creating player")),
    responses(
        (status = 201, description = "Room created and creator seated", body = GameSnapshot),
        (status = 400, description = "Missing or invalid client identity")
    )
)]
/// Create a fresh room and seat the creator in it.
pub async fn create_room(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<(StatusCode, Json<GameSnapshot>), AppError> {
    let player = client_id(&headers)?;
    let snapshot = room_service::create_room(&state, player, payload.name).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[utoipa::path(
    get,
    path = "/game/{id}",
    tag = "game",
    params(("id" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Current room snapshot", body = GameSnapshot),
        (status = 404, description = "Room not found")
    )
)]
/// Read the current snapshot of a room.
pub async fn read_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<GameSnapshot>, AppError> {
    let snapshot = room_service::read_room(&state, &id).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/game/join/{id}",
    tag = "game",
    request_body = JoinRequest,
    params(
        ("id" = String, Path, description = "Room code"),
        ("clientId" = String, Header, description = "Identity of the joining player")
    ),
    responses(
        (status = 200, description = "Player seated in the room", body = GameSnapshot),
        (status = 404, description = "Room not found"),
        (status = 409, description = "Game already started")
    )
)]
/// Seat a player in an existing room, or reconnect them into their seat.
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<GameSnapshot>, AppError> {
    let player = client_id(&headers)?;
    let snapshot = room_service::join_room(&state, &id, player, payload.name).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/game/leave/{id}",
    tag = "game",
    params(
        ("id" = String, Path, description = "Room code"),
        ("clientId" = String, Header, description = "Identity of the leaving player")
    ),
    responses(
        (status = 200, description = "Player removed from the room", body = GameSnapshot),
        (status = 404, description = "Room not found")
    )
)]
/// Remove a player from a room.
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameSnapshot>, AppError> {
    let player = client_id(&headers)?;
    let snapshot = room_service::leave_room(&state, &id, player).await?;
    Ok(Json(snapshot))
}

fn client_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get("clientId")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| AppError::BadRequest("missing or invalid clientId header".into()))
}
