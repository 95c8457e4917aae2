//! Application-level configuration loaded from the environment.

use std::env;

use tracing::warn;

/// Environment variable overriding the wagering countdown length.
const COUNTDOWN_SECS_ENV: &str = "PLAYLIST_WARS_COUNTDOWN_SECS";
/// Environment variable overriding the room code length.
const ROOM_CODE_LENGTH_ENV: &str = "PLAYLIST_WARS_ROOM_CODE_LENGTH";

/// Seconds granted to token holders before wagering opens.
const DEFAULT_COUNTDOWN_SECS: u32 = 5;
/// Characters in a room code.
const DEFAULT_ROOM_CODE_LENGTH: usize = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Length of the pre-wagering countdown, in seconds.
    pub countdown_secs: u32,
    /// Length of generated room codes.
    pub room_code_length: usize,
}

impl AppConfig {
    /// Load the configuration from the environment, falling back to the
    /// built-in defaults on absent or unparsable values.
    pub fn load() -> Self {
        Self {
            countdown_secs: env_or(COUNTDOWN_SECS_ENV, DEFAULT_COUNTDOWN_SECS),
            room_code_length: env_or(ROOM_CODE_LENGTH_ENV, DEFAULT_ROOM_CODE_LENGTH),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            room_code_length: DEFAULT_ROOM_CODE_LENGTH,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "unparsable value; using default");
                fallback
            }
        },
        Err(_) => fallback,
    }
}
