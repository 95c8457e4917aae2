//! Business logic behind the REST and WebSocket surfaces.

pub mod documentation;
pub mod health_service;
pub mod room_service;
pub mod websocket_service;
