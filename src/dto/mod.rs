//! Wire-format types shared by the REST and WebSocket surfaces.

pub mod game;
pub mod health;
pub mod ws;
