use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Playlist Wars backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_room,
        crate::routes::game::read_room,
        crate::routes::game::join_room,
        crate::routes::game::leave_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::JoinRequest,
            crate::dto::game::GameSnapshot,
            crate::dto::game::PlayerSnapshot,
            crate::dto::game::TrackSnapshot,
            crate::dto::game::TokenWagerSnapshot,
            crate::dto::game::GuessSnapshot,
            crate::dto::game::LogSnapshot,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::GameAction,
            crate::dto::ws::TrackInput,
            crate::dto::ws::ServerEvent,
            crate::dto::ws::AlertKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Room lifecycle operations"),
        (name = "ws", description = "WebSocket game protocol"),
    )
)]
pub struct ApiDoc;
